use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    SceneInstanced,
    SceneFailed,
    SceneDestroyed,
    ObjectInstanced,
    ObjectDestroyed,
    ObjectTransferred,
    CloneCreated,
    CloneExpired,
}

/// A scene lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub scene: String,
    pub object: Option<String>,
    pub frame: u64,
}

type Listener = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Lifecycle event bus with a bounded history.
///
/// Events are queued by `emit` and delivered to listeners on `flush`, so
/// listeners never run in the middle of a lifecycle operation.
pub struct EventBus {
    listeners: HashMap<LifecycleKind, Vec<(u64, Listener)>>,
    next_listener_id: u64,
    history: VecDeque<LifecycleEvent>,
    capacity: usize,
    /// JSON lines log (if enabled).
    log_file: Option<PathBuf>,
    pending: Vec<LifecycleEvent>,
    frame: u64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            listeners: HashMap::new(),
            next_listener_id: 0,
            history: VecDeque::with_capacity(capacity),
            capacity,
            log_file: None,
            pending: Vec::new(),
            frame: 0,
        }
    }

    pub fn enable_file_logging(&mut self, path: PathBuf) {
        self.log_file = Some(path);
    }

    pub fn emit(&mut self, kind: LifecycleKind, scene: &str, object: Option<&str>) {
        tracing::debug!("{:?} scene='{}' object={:?}", kind, scene, object);
        self.pending.push(LifecycleEvent {
            kind,
            scene: scene.to_string(),
            object: object.map(str::to_string),
            frame: self.frame,
        });
    }

    /// Register a listener for one event kind. Returns an id for removal.
    pub fn listen<F>(&mut self, kind: LifecycleKind, callback: F) -> u64
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    pub fn remove_listener(&mut self, listener_id: u64) {
        for listeners in self.listeners.values_mut() {
            listeners.retain(|(id, _)| *id != listener_id);
        }
    }

    /// Deliver pending events to listeners, the history and the log file.
    /// Returns the number of events delivered.
    pub fn flush(&mut self) -> usize {
        let events: Vec<LifecycleEvent> = self.pending.drain(..).collect();

        for event in &events {
            if let Some(listeners) = self.listeners.get(&event.kind) {
                for (_id, callback) in listeners {
                    callback(event);
                }
            }

            if self.history.len() >= self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(event.clone());

            if let Some(log_path) = &self.log_file {
                if let Ok(json) = serde_json::to_string(event) {
                    let written = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(log_path)
                        .and_then(|mut f| {
                            use std::io::Write;
                            writeln!(f, "{}", json)
                        });
                    if let Err(e) = written {
                        tracing::warn!("Failed to write event log {:?}: {}", log_path, e);
                    }
                }
            }
        }

        events.len()
    }

    pub fn advance_frame(&mut self) {
        self.frame += 1;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn history(&self) -> &VecDeque<LifecycleEvent> {
        &self.history
    }

    /// Number of delivered events of one kind still in the history.
    pub fn count(&self, kind: LifecycleKind) -> usize {
        self.history.iter().filter(|e| e.kind == kind).count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
