//! Window-less collaborators. They keep a ledger of what they were asked to
//! do so the runtime can report it and tests can inspect it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::Vec3;

use tessera_core::components::Transform;
use tessera_core::environment::{FogParams, ShadowTechnique, SkyParams, SoundProps, ViewportOrientation};
use tessera_core::events::EventBus;

use crate::collaborators::{
    AudioSystem, BatchId, DebugLine, LogicSystem, RenderBackend, RenderContextId, ViewportId,
    VisualDesc, VisualId, WindowSystem,
};
use crate::config::EngineConfig;
use crate::context::Services;
use crate::directory::ObjectDirectory;
use crate::groups::GroupManager;
use crate::physics::{RapierDriver, WorldCounter};
use crate::stats::StageTimer;

#[derive(Debug, Default)]
pub struct RenderLedger {
    next_id: u64,
    pub contexts: HashSet<RenderContextId>,
    /// Viewport and the camera visual it looks through.
    pub viewports: HashMap<ViewportId, VisualId>,
    pub visuals: HashMap<VisualId, String>,
    pub parents: HashMap<VisualId, VisualId>,
    pub batches: HashMap<BatchId, (String, usize)>,
    pub skybox: Option<String>,
    pub background: Option<Vec3>,
    pub ambient: Option<Vec3>,
    pub fog: Option<FogParams>,
    pub shadows: Option<ShadowTechnique>,
    pub orientation: Option<ViewportOrientation>,
    pub lines_drawn: usize,
    /// Every call, in order.
    pub calls: Vec<&'static str>,
}

impl RenderLedger {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn visual_named(&self, name: &str) -> Option<VisualId> {
        self.visuals
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
    }
}

/// Renderer that only records.
#[derive(Debug, Default, Clone)]
pub struct HeadlessRenderer {
    ledger: Rc<RefCell<RenderLedger>>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> Rc<RefCell<RenderLedger>> {
        self.ledger.clone()
    }
}

impl RenderBackend for HeadlessRenderer {
    fn create_context(&mut self, name: &str) -> RenderContextId {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("create_context");
        let id = RenderContextId(ledger.next());
        ledger.contexts.insert(id);
        tracing::debug!("Render context {:?} for '{}'", id, name);
        id
    }

    fn destroy_context(&mut self, context: RenderContextId) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("destroy_context");
        ledger.contexts.remove(&context);
    }

    fn set_skybox(&mut self, _context: RenderContextId, sky: &SkyParams) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("set_skybox");
        ledger.skybox = Some(sky.material.clone());
    }

    fn set_ambient_light(&mut self, _context: RenderContextId, color: Vec3) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("set_ambient_light");
        ledger.ambient = Some(color);
    }

    fn set_fog(&mut self, _context: RenderContextId, fog: &FogParams) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("set_fog");
        ledger.fog = Some(fog.clone());
    }

    fn set_shadow_technique(
        &mut self,
        _context: RenderContextId,
        technique: ShadowTechnique,
        _color: Vec3,
        _far_distance: f32,
    ) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("set_shadow_technique");
        ledger.shadows = Some(technique);
    }

    fn create_viewport(&mut self, camera: VisualId) -> ViewportId {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("create_viewport");
        let id = ViewportId(ledger.next());
        ledger.viewports.insert(id, camera);
        id
    }

    fn set_viewport_camera(&mut self, viewport: ViewportId, camera: VisualId) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("set_viewport_camera");
        ledger.viewports.insert(viewport, camera);
    }

    fn set_background_color(&mut self, _viewport: ViewportId, color: Vec3) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("set_background_color");
        ledger.background = Some(color);
    }

    fn set_viewport_orientation(&mut self, _viewport: ViewportId, orientation: ViewportOrientation) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("set_viewport_orientation");
        ledger.orientation = Some(orientation);
    }

    fn remove_viewport(&mut self, viewport: ViewportId) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("remove_viewport");
        ledger.viewports.remove(&viewport);
    }

    fn create_visual(&mut self, _context: RenderContextId, desc: &VisualDesc<'_>) -> VisualId {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("create_visual");
        let id = VisualId(ledger.next());
        ledger.visuals.insert(id, desc.name.to_string());
        id
    }

    fn destroy_visual(&mut self, visual: VisualId) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("destroy_visual");
        ledger.visuals.remove(&visual);
        ledger.parents.remove(&visual);
    }

    fn attach_visual(&mut self, child: VisualId, parent: VisualId) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("attach_visual");
        ledger.parents.insert(child, parent);
    }

    fn set_visual_transform(&mut self, _visual: VisualId, _transform: &Transform) {
        self.ledger.borrow_mut().calls.push("set_visual_transform");
    }

    fn create_static_batch(
        &mut self,
        _context: RenderContextId,
        material: &str,
        members: &[VisualId],
    ) -> BatchId {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("create_static_batch");
        let id = BatchId(ledger.next());
        ledger.batches.insert(id, (material.to_string(), members.len()));
        id
    }

    fn destroy_static_batch(&mut self, batch: BatchId) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("destroy_static_batch");
        ledger.batches.remove(&batch);
    }

    fn draw_lines(&mut self, _context: RenderContextId, lines: &[DebugLine]) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push("draw_lines");
        ledger.lines_drawn += lines.len();
    }
}

#[derive(Debug, Default)]
pub struct AudioLedger {
    pub applied: Option<SoundProps>,
    pub garbage_collections: usize,
    pub updates: usize,
    pub listener: Option<Transform>,
    pub stops: usize,
}

#[derive(Debug, Default, Clone)]
pub struct HeadlessAudio {
    ledger: Rc<RefCell<AudioLedger>>,
}

impl HeadlessAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> Rc<RefCell<AudioLedger>> {
        self.ledger.clone()
    }
}

impl AudioSystem for HeadlessAudio {
    fn apply_scene_properties(&mut self, props: &SoundProps) {
        self.ledger.borrow_mut().applied = Some(props.clone());
    }

    fn collect_garbage(&mut self) {
        self.ledger.borrow_mut().garbage_collections += 1;
    }

    fn update(&mut self, listener: Option<&Transform>) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.updates += 1;
        ledger.listener = listener.copied();
    }

    fn stop_all(&mut self) {
        self.ledger.borrow_mut().stops += 1;
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessWindow {
    size: (u32, u32),
    clears: Rc<RefCell<usize>>,
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            clears: Rc::default(),
        }
    }

    pub fn clear_count(&self) -> usize {
        *self.clears.borrow()
    }
}

impl WindowSystem for HeadlessWindow {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn clear_states(&mut self) {
        *self.clears.borrow_mut() += 1;
    }
}

#[derive(Debug, Default)]
pub struct LogicLedger {
    pub known: HashSet<String>,
    pub runs: Vec<String>,
    pub brick_updates: usize,
    pub node_updates: usize,
    pub unloads: usize,
    pub scene_teardowns: usize,
}

/// Logic system that knows script names but runs nothing.
#[derive(Debug, Default, Clone)]
pub struct RecordingLogic {
    ledger: Rc<RefCell<LogicLedger>>,
}

impl RecordingLogic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, name: &str) -> Self {
        self.ledger.borrow_mut().known.insert(name.to_string());
        self
    }

    pub fn ledger(&self) -> Rc<RefCell<LogicLedger>> {
        self.ledger.clone()
    }
}

impl LogicSystem for RecordingLogic {
    fn run_script(&mut self, name: &str) -> bool {
        let mut ledger = self.ledger.borrow_mut();
        if !ledger.known.contains(name) {
            return false;
        }
        ledger.runs.push(name.to_string());
        true
    }

    fn update_bricks(&mut self, _dt: f32) {
        self.ledger.borrow_mut().brick_updates += 1;
    }

    fn update_nodes(&mut self, _dt: f32) {
        self.ledger.borrow_mut().node_updates += 1;
    }

    fn unload_scripts(&mut self) {
        self.ledger.borrow_mut().unloads += 1;
    }

    fn notify_scene_destroyed(&mut self) {
        self.ledger.borrow_mut().scene_teardowns += 1;
    }
}

/// Services wired with headless collaborators and the rapier driver, plus
/// handles onto everything they record.
pub struct HeadlessHarness {
    pub services: Services,
    pub render: Rc<RefCell<RenderLedger>>,
    pub audio: Rc<RefCell<AudioLedger>>,
    pub logic: Rc<RefCell<LogicLedger>>,
    pub window: HeadlessWindow,
    pub worlds: WorldCounter,
    pub timer: Rc<RefCell<StageTimer>>,
}

impl HeadlessHarness {
    pub fn new(config: EngineConfig) -> Self {
        let renderer = HeadlessRenderer::new();
        let audio = HeadlessAudio::new();
        let logic = RecordingLogic::new().with_script(&config.init_script);
        let window = HeadlessWindow::new(config.window_size[0], config.window_size[1]);
        let driver = RapierDriver::new();
        let timer = Rc::new(RefCell::new(StageTimer::new()));

        let mut events = EventBus::default();
        if let Some(path) = &config.event_log {
            events.enable_file_logging(path.clone());
        }

        Self {
            render: renderer.ledger(),
            audio: audio.ledger(),
            logic: logic.ledger(),
            window: window.clone(),
            worlds: driver.world_counter(),
            timer: timer.clone(),
            services: Services {
                config,
                directory: ObjectDirectory::new(),
                renderer: Box::new(renderer),
                physics: Box::new(driver),
                groups: Box::new(GroupManager::new()),
                logic: Box::new(logic),
                audio: Box::new(audio),
                window: Box::new(window),
                stats: Box::new(timer),
                events,
                active_scene: None,
            },
        }
    }
}
