//! Navigation mesh input tracking and the background builder.
//!
//! The scene keeps a `NavigationData` accumulator of walkable geometry. When
//! it has changed, a deep copy is submitted to the `NavMeshWorker`, which
//! builds the mesh on its own thread. The simulation polls for results; a
//! result older than the newest one already accepted is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;
use serde::Deserialize;

use tessera_core::components::{Aabb, MeshData, ObjectHandle, ObjectKind, PhysicsKind};

use crate::directory::ObjectDirectory;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NavMeshConfig {
    /// Steepest walkable slope.
    #[serde(default = "default_max_slope")]
    pub max_slope_degrees: f32,
    /// Triangles smaller than this are ignored.
    #[serde(default)]
    pub min_triangle_area: f32,
}

fn default_max_slope() -> f32 {
    45.0
}

impl Default for NavMeshConfig {
    fn default() -> Self {
        Self {
            max_slope_degrees: default_max_slope(),
            min_triangle_area: 0.0,
        }
    }
}

pub type Triangle = [Vec3; 3];

/// Owned copy of the navigation input.
#[derive(Debug, Clone, Default)]
pub struct MeshSnapshot {
    pub triangles: Vec<Triangle>,
}

/// World-space walkable candidates, keyed by the object they came from.
#[derive(Debug, Default)]
pub struct NavigationData {
    entries: HashMap<ObjectHandle, Vec<Triangle>>,
    changed: bool,
}

impl NavigationData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) the geometry of a static mesh object. Anything
    /// else is ignored.
    pub fn update_or_create(
        &mut self,
        object: ObjectHandle,
        directory: &ObjectDirectory,
        meshes: &HashMap<String, MeshData>,
    ) -> bool {
        let is_static = directory
            .properties(object)
            .map_or(false, |p| p.physics.kind == PhysicsKind::Static);
        if !is_static {
            return false;
        }
        let Some(world) = directory.world_transform(object) else {
            return false;
        };
        let Some(kind) = directory.kind(object) else {
            return false;
        };
        let ObjectKind::Entity(entity) = &*kind else {
            return false;
        };
        let mesh = entity
            .mesh
            .as_ref()
            .or_else(|| entity.mesh_name.as_ref().and_then(|n| meshes.get(n)));
        let Some(mesh) = mesh else {
            return false;
        };

        let matrix = world.to_matrix();
        let points: Vec<Vec3> = mesh.points().map(|p| matrix.transform_point3(p)).collect();
        let triangles = mesh
            .triangles
            .iter()
            .filter_map(|[a, b, c]| {
                Some([
                    *points.get(*a as usize)?,
                    *points.get(*b as usize)?,
                    *points.get(*c as usize)?,
                ])
            })
            .collect();
        self.entries.insert(object, triangles);
        self.changed = true;
        true
    }

    pub fn destroy_instance(&mut self, object: ObjectHandle) {
        if self.entries.remove(&object).is_some() {
            self.changed = true;
        }
    }

    pub fn destroy_instances(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.changed = true;
        }
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn reset_has_changed(&mut self) {
        self.changed = false;
    }

    pub fn contains(&self, object: ObjectHandle) -> bool {
        self.entries.contains_key(&object)
    }

    pub fn clone_data(&self) -> MeshSnapshot {
        MeshSnapshot {
            triangles: self.entries.values().flatten().copied().collect(),
        }
    }
}

/// A built navigation mesh.
#[derive(Debug, Clone)]
pub struct NavMesh {
    pub version: u64,
    pub walkable: Vec<Triangle>,
    pub bounds: Aabb,
    pub area: f32,
}

impl NavMesh {
    pub fn build(snapshot: &MeshSnapshot, config: &NavMeshConfig, version: u64) -> Self {
        let min_up = config.max_slope_degrees.to_radians().cos();
        let mut walkable = Vec::new();
        let mut bounds = Aabb::NULL;
        let mut area = 0.0;
        for tri in &snapshot.triangles {
            let cross = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
            let tri_area = cross.length() * 0.5;
            if tri_area <= config.min_triangle_area || tri_area <= f32::EPSILON {
                continue;
            }
            if cross.normalize().dot(Vec3::Y) < min_up {
                continue;
            }
            for p in tri {
                bounds.merge_point(*p);
            }
            area += tri_area;
            walkable.push(*tri);
        }
        Self {
            version,
            walkable,
            bounds,
            area,
        }
    }
}

/// Receipt for a submitted build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NavMeshTicket(pub u64);

struct Job {
    version: u64,
    snapshot: MeshSnapshot,
    config: NavMeshConfig,
}

/// Background navigation mesh builder running on its own thread.
pub struct NavMeshWorker {
    jobs: Option<Sender<Job>>,
    results: Receiver<NavMesh>,
    thread: Option<JoinHandle<()>>,
    next_version: u64,
    current: Option<Arc<NavMesh>>,
}

impl NavMeshWorker {
    pub fn new() -> std::io::Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("tessera-navmesh".to_string())
            .spawn(move || {
                for job in job_rx {
                    let mesh = NavMesh::build(&job.snapshot, &job.config, job.version);
                    if result_tx.send(mesh).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            thread: Some(thread),
            next_version: 0,
            current: None,
        })
    }

    /// Queue a build. The snapshot is moved to the worker.
    pub fn submit(&mut self, snapshot: MeshSnapshot, config: NavMeshConfig) -> NavMeshTicket {
        self.next_version += 1;
        let version = self.next_version;
        if let Some(jobs) = &self.jobs {
            if jobs
                .send(Job {
                    version,
                    snapshot,
                    config,
                })
                .is_err()
            {
                tracing::error!("Navigation mesh worker has stopped");
            }
        }
        NavMeshTicket(version)
    }

    /// Collect finished builds without blocking. Returns the mesh when a
    /// newer one than the current has arrived.
    pub fn poll(&mut self) -> Option<Arc<NavMesh>> {
        let mut updated = None;
        for mesh in self.results.try_iter() {
            let newer = self
                .current
                .as_ref()
                .map_or(true, |current| mesh.version > current.version);
            if newer {
                let mesh = Arc::new(mesh);
                self.current = Some(mesh.clone());
                updated = Some(mesh);
            } else {
                tracing::debug!("Dropping stale navigation mesh v{}", mesh.version);
            }
        }
        updated
    }

    pub fn current(&self) -> Option<Arc<NavMesh>> {
        self.current.clone()
    }

    /// True when the current mesh reflects the latest submission.
    pub fn is_up_to_date(&self) -> bool {
        self.current
            .as_ref()
            .map_or(self.next_version == 0, |m| m.version == self.next_version)
    }
}

impl Drop for NavMeshWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Navigation mesh worker panicked");
            }
        }
    }
}
