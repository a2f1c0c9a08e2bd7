//! The engine owns every scene and the shared services, and drives the
//! frame loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use tessera_core::components::{ObjectHandle, SceneId};
use tessera_core::scene_file::{ConstraintDef, SceneFile};

use crate::collaborators::GroupPlacement;
use crate::constraints::Constraint;
use crate::context::Services;
use crate::error::SceneError;
use crate::navmesh::{NavMesh, NavMeshWorker};
use crate::scene::{InstanceState, Scene};

pub struct Engine {
    services: Services,
    scenes: BTreeMap<SceneId, Scene>,
    next_scene: u32,
    frame_count: u64,
    /// One background builder per scene with navigation enabled.
    navigation: BTreeMap<SceneId, NavMeshWorker>,
}

impl Engine {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            scenes: BTreeMap::new(),
            next_scene: 0,
            frame_count: 0,
            navigation: BTreeMap::new(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn create_scene(&mut self, name: &str) -> SceneId {
        self.next_scene += 1;
        let id = SceneId(self.next_scene);
        self.scenes.insert(id, Scene::new(id, name));
        tracing::debug!("Created scene '{}' as {}", name, id);
        id
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(&id)
    }

    pub fn find_scene(&self, name: &str) -> Option<SceneId> {
        self.scenes
            .values()
            .find(|scene| scene.name() == name)
            .map(Scene::id)
    }

    /// Run `f` against one scene with the services at hand.
    pub fn with_scene<R>(
        &mut self,
        id: SceneId,
        f: impl FnOnce(&mut Scene, &mut Services) -> R,
    ) -> Result<R, SceneError> {
        let scene = self
            .scenes
            .get_mut(&id)
            .ok_or(SceneError::UnknownScene(id))?;
        Ok(f(scene, &mut self.services))
    }

    pub fn has_object(&self, id: SceneId, name: &str) -> bool {
        self.scenes
            .get(&id)
            .map_or(false, |scene| scene.has_object(&self.services, name))
    }

    /// Register `object` with a scene. An object owned by another scene is
    /// moved: it leaves the old scene's registry (and runtime) and joins the
    /// new one in a single call.
    pub fn add_object(&mut self, id: SceneId, object: ObjectHandle) -> bool {
        let Some(name) = self.services.directory.name(object) else {
            tracing::warn!("Cannot add a deallocated object to {}", id);
            return false;
        };
        if !self.scenes.contains_key(&id) {
            tracing::warn!("Cannot add '{}' to unknown {}", name, id);
            return false;
        }

        let source = self
            .services
            .directory
            .owner(object)
            .filter(|owner| *owner != id && self.scenes.contains_key(owner));
        let Some(source) = source else {
            let added = self.with_scene(id, |scene, svc| scene.add_object(svc, object));
            return matches!(added, Ok(true));
        };

        if self.has_object(id, &name) {
            tracing::warn!(
                "Cannot move '{}' from {} to {}: name already taken",
                name,
                source,
                id
            );
            return false;
        }
        let erased = self.with_scene(source, |scene, svc| scene.erase_object(svc, object));
        if !matches!(erased, Ok(true)) {
            return false;
        }
        self.with_scene(id, |scene, svc| scene.adopt_object(svc, object))
            .is_ok()
    }

    pub fn instantiate(&mut self, id: SceneId) -> Result<InstanceState, SceneError> {
        self.with_scene(id, |scene, svc| scene.instantiate(svc))?
    }

    pub fn destroy_instance(&mut self, id: SceneId) -> Result<(), SceneError> {
        self.with_scene(id, |scene, svc| scene.destroy_instance(svc))
    }

    /// Tear a scene down and drop it. Its registered objects are
    /// deallocated.
    pub fn remove_scene(&mut self, id: SceneId) -> Result<(), SceneError> {
        let mut scene = self.scenes.remove(&id).ok_or(SceneError::UnknownScene(id))?;
        self.navigation.remove(&id);
        scene.destroy_instance(&mut self.services);
        scene.destroy_clones(&mut self.services);
        let names: Vec<String> = scene.object_names().map(str::to_string).collect();
        for name in names {
            if let Some(object) = scene.get_object(&self.services, &name) {
                scene.destroy_object(&mut self.services, object);
            }
        }
        tracing::info!("Removed scene '{}'", scene.name());
        Ok(())
    }

    /// One frame for every instanced scene, then deliver lifecycle events.
    pub fn step(&mut self) {
        let tick_rate = self.services.config.tick_rate;
        for scene in self.scenes.values_mut() {
            if !scene.is_instanced() {
                continue;
            }
            scene.begin_frame(&mut self.services);
            scene.update(&mut self.services, tick_rate);
            if let Some(worker) = self.navigation.get_mut(&scene.id()) {
                scene.async_try_create_navigation_mesh(worker, &self.services.config.navigation);
            }
        }
        for (id, worker) in &mut self.navigation {
            if let Some(mesh) = worker.poll() {
                tracing::info!(
                    "Navigation mesh v{} ready for {}: {} walkable triangles",
                    mesh.version,
                    id,
                    mesh.walkable.len()
                );
            }
        }
        self.services.events.flush();
        self.services.events.advance_frame();
        self.frame_count += 1;
    }

    pub fn run_frames(&mut self, frames: u64) {
        for _ in 0..frames {
            self.step();
        }
    }

    /// Start tracking navigation geometry for a scene and give it its own
    /// background builder.
    pub fn enable_navigation(&mut self, id: SceneId) -> Result<(), SceneError> {
        self.with_scene(id, |scene, svc| scene.enable_navigation(svc))?;
        if !self.navigation.contains_key(&id) {
            self.navigation.insert(id, NavMeshWorker::new()?);
        }
        Ok(())
    }

    /// The newest navigation mesh delivered for a scene.
    pub fn navigation_mesh(&self, id: SceneId) -> Option<Arc<NavMesh>> {
        self.navigation.get(&id).and_then(NavMeshWorker::current)
    }

    pub fn navigation_worker(&mut self, id: SceneId) -> Option<&mut NavMeshWorker> {
        self.navigation.get_mut(&id)
    }

    /// Build an uninstanced scene from a parsed scene file. Objects that
    /// cannot be registered and constraints with unknown objects are
    /// skipped with a warning.
    pub fn load_scene_file(&mut self, file: &SceneFile) -> Result<SceneId, SceneError> {
        let id = self.create_scene(&file.name);
        self.with_scene(id, |scene, svc| populate(scene, svc, file))?;
        tracing::info!(
            "Loaded scene '{}' with {} objects",
            file.name,
            self.scenes.get(&id).map_or(0, Scene::object_count)
        );
        Ok(id)
    }
}

fn populate(scene: &mut Scene, svc: &mut Services, file: &SceneFile) {
    scene.set_environment(file.settings.environment());
    scene.set_layer_mask(file.settings.layers);

    for mesh in &file.meshes {
        scene.insert_mesh(&mesh.name, mesh.to_mesh());
    }

    for def in &file.objects {
        let object = svc
            .directory
            .create(&def.name, def.kind(), def.transform(), def.properties());
        if !scene.add_object(svc, object) {
            svc.directory.destroy(object);
        }
    }

    for def in &file.constraints {
        let Some(object) = scene.get_object(svc, def.object()) else {
            tracing::warn!("Constraint on unknown object '{}'", def.object());
            continue;
        };
        let constraint = match def {
            ConstraintDef::LimitLocation {
                min, max, influence, ..
            } => Constraint::LimitLocation {
                min: Vec3::from_array(*min),
                max: Vec3::from_array(*max),
                influence: *influence,
            },
            ConstraintDef::CopyLocation {
                target,
                offset,
                influence,
                ..
            } => {
                let Some(target) = scene.get_object(svc, target) else {
                    tracing::warn!("Constraint target '{}' not found", target);
                    continue;
                };
                Constraint::CopyLocation {
                    target,
                    offset: Vec3::from_array(*offset),
                    influence: *influence,
                }
            }
        };
        scene.add_constraint(svc, object, constraint);
    }

    for group in &file.groups {
        svc.groups.define_group(&group.name, group.objects.clone());
    }
    for placement in &file.group_instances {
        svc.groups.place_group(
            scene.id(),
            GroupPlacement {
                name: placement.name.clone(),
                group: placement.group.clone(),
                transform: placement.transform(),
            },
        );
    }

    if let Some(name) = &file.main_camera {
        match scene.get_object(svc, name) {
            Some(camera) => {
                scene.set_main_camera(svc, camera);
            }
            None => tracing::warn!("Main camera '{}' not found", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use tessera_core::components::{MeshData, ObjectKind, ObjectProperties, PhysicsKind, Transform};
    use tessera_core::events::LifecycleKind;
    use tessera_core::scene_file::parse_scene;

    use crate::config::EngineConfig;
    use crate::headless::HeadlessHarness;
    use crate::physics::WorldCounter;

    const LEVEL: &str = r#"
name: "Level"
settings:
  layers: 1
meshes:
  - name: CubeMesh
    cube: 1.0
objects:
  - name: Cam
    transform:
      position: [0, 2, 8]
    camera:
      fov: 60
  - name: Floor
    transform:
      position: [0, -2, 0]
    entity:
      mesh: CubeMesh
      material: Stone
    physics:
      kind: static
      shape:
        type: mesh
  - name: Ball
    transform:
      position: [0, 5, 0]
    entity:
      mesh: CubeMesh
      material: Rubber
    physics:
      kind: rigid
  - name: Marker
    transform:
      position: [9, 0, 0]
    entity:
      material: Paint
  - name: Post
    layer: 4
    entity:
      mesh: CubeMesh
      material: Wood
main_camera: Cam
groups:
  - name: Fence
    objects: [Post]
group_instances:
  - name: Fence.001
    group: Fence
    transform:
      position: [10, 0, 0]
constraints:
  - type: limit_location
    object: Marker
    min: [-1, -1, -1]
    max: [1, 1, 1]
  - type: copy_location
    object: Marker
    target: Nowhere
"#;

    fn engine() -> (Engine, WorldCounter) {
        let HeadlessHarness {
            services, worlds, ..
        } = HeadlessHarness::new(EngineConfig::default());
        (Engine::new(services), worlds)
    }

    fn empty(engine: &mut Engine, scene: SceneId, name: &str) -> ObjectHandle {
        let object = engine.services_mut().directory.create(
            name,
            ObjectKind::Empty,
            Transform::default(),
            ObjectProperties::default(),
        );
        assert!(engine.add_object(scene, object));
        object
    }

    #[test]
    fn objects_move_between_scenes() {
        let (mut engine, _h) = engine();
        let s1 = engine.create_scene("S1");
        let s2 = engine.create_scene("S2");
        let boxed = empty(&mut engine, s1, "Box");
        empty(&mut engine, s2, "Anchor");
        engine.instantiate(s1).unwrap();
        engine.instantiate(s2).unwrap();
        assert!(engine.services().directory.is_instanced(boxed));

        assert!(engine.add_object(s2, boxed));
        assert!(!engine.has_object(s1, "Box"));
        assert!(engine.has_object(s2, "Box"));
        assert_eq!(engine.services().directory.owner(boxed), Some(s2));
        assert!(engine.services().directory.is_instanced(boxed));
        assert!(!engine.scene(s1).unwrap().object_names().any(|n| n == "Box"));

        engine.step();
        assert_eq!(
            engine
                .services()
                .events
                .count(LifecycleKind::ObjectTransferred),
            1
        );
    }

    #[test]
    fn moved_main_camera_is_not_kept_by_the_old_scene() {
        let (mut engine, _h) = engine();
        let s1 = engine.create_scene("S1");
        let s2 = engine.create_scene("S2");
        let cam = engine
            .with_scene(s1, |scene, svc| scene.create_camera(svc, "Cam"))
            .unwrap()
            .unwrap();
        empty(&mut engine, s1, "Cube");
        empty(&mut engine, s2, "Anchor");
        assert!(engine
            .with_scene(s1, |scene, svc| scene.set_main_camera(svc, cam))
            .unwrap());

        assert!(engine.add_object(s2, cam));
        assert_eq!(engine.scene(s1).unwrap().main_camera(), None);

        engine.instantiate(s1).unwrap();
        let main = engine.scene(s1).unwrap().main_camera();
        assert!(main.is_some());
        assert_ne!(main, Some(cam));
        assert!(!engine.services().directory.is_instanced(cam));
        assert_eq!(engine.services().directory.owner(cam), Some(s2));
    }

    #[test]
    fn move_onto_a_taken_name_is_refused() {
        let (mut engine, _h) = engine();
        let s1 = engine.create_scene("S1");
        let s2 = engine.create_scene("S2");
        let first = empty(&mut engine, s1, "Box");
        empty(&mut engine, s2, "Box");

        assert!(!engine.add_object(s2, first));
        assert!(engine.has_object(s1, "Box"));
        assert_eq!(engine.services().directory.owner(first), Some(s1));
    }

    #[test]
    fn unknown_scene_is_an_error() {
        let (mut engine, _h) = engine();
        assert!(matches!(
            engine.instantiate(SceneId(42)),
            Err(SceneError::UnknownScene(SceneId(42)))
        ));
    }

    #[test]
    fn scene_file_loads_and_runs() {
        let (mut engine, worlds) = engine();
        let file = parse_scene(LEVEL).unwrap();
        let id = engine.load_scene_file(&file).unwrap();
        assert_eq!(engine.find_scene("Level"), Some(id));
        assert!(engine.has_object(id, "Floor"));
        assert!(engine.scene(id).unwrap().has_mesh("CubeMesh"));

        assert_eq!(engine.instantiate(id).unwrap(), InstanceState::Instanced);
        let svc = engine.services();
        let cam = engine.scene(id).unwrap().get_object(svc, "Cam").unwrap();
        let post = engine.scene(id).unwrap().get_object(svc, "Post").unwrap();
        assert_eq!(engine.scene(id).unwrap().main_camera(), Some(cam));
        // The template sits on a hidden layer, its placement does not
        assert!(!svc.directory.is_instanced(post));
        let member = svc.directory.find_owned("Fence.001/Post", id).unwrap();
        assert!(svc.directory.is_instanced(member));
        assert_eq!(
            svc.directory.transform(member).unwrap().position,
            Vec3::new(10.0, 0.0, 0.0)
        );
        assert_eq!(engine.scene(id).unwrap().static_controller_count(), 1);

        engine.run_frames(10);
        let svc = engine.services();
        let scene = engine.scene(id).unwrap();
        let marker = scene.get_object(svc, "Marker").unwrap();
        let ball = scene.get_object(svc, "Ball").unwrap();
        assert_eq!(
            svc.directory.transform(marker).unwrap().position,
            Vec3::new(1.0, 0.0, 0.0)
        );
        assert!(svc.directory.transform(ball).unwrap().position.y < 5.0);
        assert_eq!(scene.frame(), 10);
        assert_eq!(engine.frame_count(), 10);
        assert_eq!(worlds.get(), 1);
    }

    #[test]
    fn clones_expire_through_the_engine() {
        let (mut engine, _h) = engine();
        let id = engine.create_scene("Level");
        let cube = empty(&mut engine, id, "Cube");
        engine.instantiate(id).unwrap();

        let clone = engine
            .with_scene(id, |scene, svc| scene.clone_object(svc, cube, 5, true))
            .unwrap()
            .unwrap();
        engine.run_frames(5);
        assert!(engine.has_object(id, "Cube.001"));
        engine.step();
        assert!(!engine.has_object(id, "Cube.001"));
        assert!(!engine.services().directory.contains(clone));
        assert_eq!(
            engine.services().events.count(LifecycleKind::CloneExpired),
            1
        );
    }

    #[test]
    fn removing_a_scene_frees_its_objects() {
        let (mut engine, worlds) = engine();
        let id = engine.create_scene("Level");
        let cube = empty(&mut engine, id, "Cube");
        engine.instantiate(id).unwrap();
        engine.remove_scene(id).unwrap();
        assert!(engine.scene(id).is_none());
        assert!(!engine.services().directory.contains(cube));
        assert_eq!(engine.services().active_scene, None);
        assert_eq!(worlds.get(), 0);
        assert!(matches!(
            engine.remove_scene(id),
            Err(SceneError::UnknownScene(_))
        ));
    }

    #[test]
    fn navigation_mesh_arrives_in_the_background() {
        let (mut engine, _h) = engine();
        let file = parse_scene(LEVEL).unwrap();
        let id = engine.load_scene_file(&file).unwrap();
        engine.instantiate(id).unwrap();
        engine.enable_navigation(id).unwrap();

        engine.step();
        let mesh = wait_for_mesh(&mut engine, id).unwrap();
        // Only the top face of the floor cube is walkable
        assert_eq!(mesh.walkable.len(), 2);
        assert!(engine.navigation_worker(id).unwrap().is_up_to_date());
    }

    fn wait_for_mesh(engine: &mut Engine, id: SceneId) -> Option<Arc<NavMesh>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.navigation_mesh(id).is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            if let Some(worker) = engine.navigation_worker(id) {
                worker.poll();
            }
        }
        engine.navigation_mesh(id)
    }

    #[test]
    fn each_scene_gets_its_own_navigation_mesh() {
        let (mut engine, _h) = engine();
        let file = parse_scene(LEVEL).unwrap();
        let level = engine.load_scene_file(&file).unwrap();
        let wide = engine.create_scene("Wide");
        engine
            .with_scene(wide, |scene, svc| {
                scene.insert_mesh("Slab", MeshData::cube(3.0));
                let ground = scene.create_entity(svc, "Ground", Some("Slab")).unwrap();
                svc.directory.properties_mut(ground).unwrap().physics.kind = PhysicsKind::Static;
            })
            .unwrap();
        for id in [level, wide] {
            engine.instantiate(id).unwrap();
            engine.enable_navigation(id).unwrap();
        }

        engine.step();
        let small = wait_for_mesh(&mut engine, level).unwrap();
        let large = wait_for_mesh(&mut engine, wide).unwrap();
        assert!(large.area > small.area);
        assert_eq!(large.walkable.len(), 2);

        engine.remove_scene(wide).unwrap();
        assert!(engine.navigation_mesh(wide).is_none());
        assert!(engine.navigation_mesh(level).is_some());
    }

    #[test]
    fn navigation_needs_a_known_scene() {
        let (mut engine, _h) = engine();
        assert!(matches!(
            engine.enable_navigation(SceneId(42)),
            Err(SceneError::UnknownScene(_))
        ));
        assert!(engine.navigation_worker(SceneId(42)).is_none());
    }
}
