//! The scene controller: registry, instancing, physics binding, clones and
//! the per-frame update.
//!
//! A `Scene` never owns engine services; every operation that touches the
//! object directory or a collaborator takes `&mut Services`.

mod clones;
mod frame;
mod lifecycle;
mod physics_binding;
mod registry;

use std::collections::{HashMap, HashSet};

use linked_hash_map::LinkedHashMap;

use tessera_core::components::{Aabb, MeshData, ObjectHandle, SceneId};
use tessera_core::environment::EnvironmentProps;

use crate::collaborators::{RenderContextId, ViewportId};
use crate::constraints::ConstraintManager;
use crate::debug::PhysicsDebugger;
use crate::navmesh::NavigationData;
use crate::physics::{ControllerId, DynamicsWorld};

/// Name of the camera synthesized when a scene has none.
pub const DEFAULT_CAMERA_NAME: &str = " -- No Camera -- ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Uninstanced,
    Creating,
    Instanced,
    Destroying,
    /// Instancing failed. The scene stays usable as a plain container.
    Error,
}

pub struct Scene {
    pub(crate) id: SceneId,
    pub(crate) name: String,
    pub(crate) state: InstanceState,

    pub(crate) objects: LinkedHashMap<String, ObjectHandle>,
    /// Clones without a life span.
    pub(crate) clones: Vec<ObjectHandle>,
    /// Clones counting down to destruction.
    pub(crate) tick_clones: Vec<ObjectHandle>,
    /// Objects queued for end-of-frame destruction. No duplicates.
    pub(crate) end_objects: Vec<ObjectHandle>,
    pub(crate) clone_counter: u32,

    pub(crate) cameras: Vec<ObjectHandle>,
    pub(crate) lights: Vec<ObjectHandle>,
    pub(crate) has_lights: bool,
    pub(crate) start_camera: Option<ObjectHandle>,

    pub(crate) render_context: Option<RenderContextId>,
    pub(crate) viewport: Option<ViewportId>,

    pub(crate) physics_world: Option<Box<dyn DynamicsWorld>>,
    pub(crate) static_controllers: HashSet<ControllerId>,
    pub(crate) limits: Aabb,
    /// Set when something moved and the broad phase needs a refresh.
    pub(crate) mark_dbvt: bool,

    pub(crate) constraints: Option<ConstraintManager>,
    pub(crate) debugger: Option<PhysicsDebugger>,
    pub(crate) navigation: Option<NavigationData>,

    pub(crate) meshes: HashMap<String, MeshData>,
    pub(crate) base: EnvironmentProps,
    pub(crate) layers: u32,
    pub(crate) frame: u64,
}

impl Scene {
    pub fn new(id: SceneId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            state: InstanceState::Uninstanced,
            objects: LinkedHashMap::new(),
            clones: Vec::new(),
            tick_clones: Vec::new(),
            end_objects: Vec::new(),
            clone_counter: 0,
            cameras: Vec::new(),
            lights: Vec::new(),
            has_lights: false,
            start_camera: None,
            render_context: None,
            viewport: None,
            physics_world: None,
            static_controllers: HashSet::new(),
            limits: Aabb::NULL,
            mark_dbvt: false,
            constraints: None,
            debugger: None,
            navigation: None,
            meshes: HashMap::new(),
            base: EnvironmentProps::default(),
            layers: u32::MAX,
            frame: 0,
        }
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_instanced(&self) -> bool {
        self.state == InstanceState::Instanced
    }

    /// Number of objects in the name map. Clones are not counted.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Registered object names in registration order.
    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn cameras(&self) -> &[ObjectHandle] {
        &self.cameras
    }

    pub fn lights(&self) -> &[ObjectHandle] {
        &self.lights
    }

    pub fn has_lights(&self) -> bool {
        self.has_lights
    }

    /// The camera the viewport looks through (or will, once instanced).
    pub fn main_camera(&self) -> Option<ObjectHandle> {
        self.start_camera
    }

    pub fn render_context(&self) -> Option<RenderContextId> {
        self.render_context
    }

    pub fn viewport(&self) -> Option<ViewportId> {
        self.viewport
    }

    pub fn clone_count(&self) -> usize {
        self.clones.len() + self.tick_clones.len()
    }

    pub fn pending_end_objects(&self) -> usize {
        self.end_objects.len()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn constraints(&self) -> Option<&ConstraintManager> {
        self.constraints.as_ref()
    }

    pub fn navigation_data(&self) -> Option<&NavigationData> {
        self.navigation.as_ref()
    }

    pub fn environment(&self) -> &EnvironmentProps {
        &self.base
    }

    pub fn set_environment(&mut self, environment: EnvironmentProps) {
        self.base = environment;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use glam::Vec3;

    use tessera_core::components::{
        CameraData, CollisionShape, EntityData, LightData, ObjectHandle, ObjectKind,
        ObjectProperties, PhysicsKind, PhysicsProperties, SceneId, Transform,
    };

    use super::Scene;
    use crate::config::EngineConfig;
    use crate::context::Services;
    use crate::headless::HeadlessHarness;

    pub fn harness() -> HeadlessHarness {
        HeadlessHarness::new(EngineConfig::default())
    }

    pub fn scene() -> Scene {
        Scene::new(SceneId(1), "Level")
    }

    pub fn entity(
        scene: &mut Scene,
        svc: &mut Services,
        name: &str,
        position: Vec3,
        kind: PhysicsKind,
    ) -> ObjectHandle {
        let h = svc.directory.create(
            name,
            ObjectKind::Entity(EntityData {
                mesh_name: Some("Cube".to_string()),
                mesh: None,
                material: "Default".to_string(),
            }),
            Transform::from_position(position),
            ObjectProperties {
                physics: PhysicsProperties {
                    kind,
                    shape: CollisionShape::Box {
                        half_extents: [0.5, 0.5, 0.5],
                    },
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        assert!(scene.add_object(svc, h));
        h
    }

    pub fn camera(scene: &mut Scene, svc: &mut Services, name: &str) -> ObjectHandle {
        let h = svc.directory.create(
            name,
            ObjectKind::Camera(CameraData::default()),
            Transform::from_position(Vec3::new(0.0, 2.0, 8.0)),
            ObjectProperties::default(),
        );
        assert!(scene.add_object(svc, h));
        h
    }

    pub fn light(scene: &mut Scene, svc: &mut Services, name: &str) -> ObjectHandle {
        let h = svc.directory.create(
            name,
            ObjectKind::Light(LightData::default()),
            Transform::from_position(Vec3::new(0.0, 5.0, 0.0)),
            ObjectProperties::default(),
        );
        assert!(scene.add_object(svc, h));
        h
    }
}
