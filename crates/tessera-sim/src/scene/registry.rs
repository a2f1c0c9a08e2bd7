use glam::Vec3;

use tessera_core::components::{
    CameraData, EntityData, LightData, MeshData, ObjectHandle, ObjectKind, ObjectProperties,
    SkeletonData, Transform,
};
use tessera_core::events::LifecycleKind;

use super::Scene;
use crate::constraints::{Constraint, ConstraintManager};
use crate::context::Services;

impl Scene {
    /// Register an object with this scene.
    ///
    /// Free objects are adopted. Objects already owned by this scene (clones,
    /// group members) are left alone. Objects owned by another scene must be
    /// moved with `Engine::add_object`.
    pub fn add_object(&mut self, svc: &mut Services, object: ObjectHandle) -> bool {
        let Some(name) = svc.directory.name(object) else {
            tracing::warn!("Scene '{}': cannot add a deallocated object", self.name);
            return false;
        };
        if self.objects.contains_key(&name) {
            tracing::warn!("Scene '{}': duplicate object '{}'", self.name, name);
            return false;
        }

        match svc.directory.owner(object) {
            Some(owner) if owner == self.id => false,
            Some(owner) => {
                tracing::warn!(
                    "Scene '{}': object '{}' belongs to {}, transfer it through the engine",
                    self.name,
                    name,
                    owner
                );
                false
            }
            None => {
                if svc.directory.is_light(object) {
                    self.has_lights = true;
                }
                svc.directory.set_owner(object, Some(self.id));
                self.objects.insert(name, object);
                true
            }
        }
    }

    /// Take ownership of an object just erased from another scene. The
    /// caller has already checked for a name clash.
    pub(crate) fn adopt_object(&mut self, svc: &mut Services, object: ObjectHandle) {
        let Some(name) = svc.directory.name(object) else {
            return;
        };
        svc.directory.set_owner(object, Some(self.id));
        if let Some(mut props) = svc.directory.properties_mut(object) {
            props.active_layer = true;
            props.layer = self.layers;
        }
        if svc.directory.is_light(object) {
            self.has_lights = true;
        }
        self.objects.insert(name.clone(), object);
        svc.events
            .emit(LifecycleKind::ObjectTransferred, &self.name, Some(name.as_str()));

        if self.is_instanced() {
            self.create_object_instance(svc, object);
        }
    }

    /// Drop an object from the name map without deallocating it. Its runtime
    /// representation is destroyed and it becomes free.
    pub(crate) fn erase_object(&mut self, svc: &mut Services, object: ObjectHandle) -> bool {
        let Some(name) = svc.directory.name(object) else {
            return false;
        };
        if self.objects.get(&name) != Some(&object) {
            tracing::warn!("Scene '{}': object '{}' not found", self.name, name);
            return false;
        }
        self.destroy_object_instance(svc, object);
        if let Some(constraints) = &mut self.constraints {
            constraints.notify_object_destroyed(object);
        }
        svc.directory.set_owner(object, None);
        self.objects.remove(&name);
        self.forget_camera(svc, object);
        true
    }

    /// Hide an object: its runtime representation goes away but it stays
    /// registered and can be instanced again.
    pub fn remove_object(&mut self, svc: &mut Services, object: ObjectHandle) -> bool {
        let Some(name) = svc.directory.name(object) else {
            return false;
        };
        if !self.has_object(svc, &name) {
            tracing::warn!("Scene '{}': object '{}' not found", self.name, name);
            return false;
        }
        self.destroy_object_instance(svc, object)
    }

    /// Destroy an owned object for good.
    pub fn destroy_object(&mut self, svc: &mut Services, object: ObjectHandle) -> bool {
        let name = svc.directory.name(object).unwrap_or_default();
        if svc.directory.owner(object) != Some(self.id) {
            tracing::warn!("Scene '{}': object '{}' not found", self.name, name);
            return false;
        }

        self.destroy_object_instance(svc, object);
        if self.objects.get(&name) == Some(&object) {
            self.objects.remove(&name);
        }
        self.clones.retain(|c| *c != object);
        self.tick_clones.retain(|c| *c != object);
        self.end_objects.retain(|c| *c != object);
        self.forget_camera(svc, object);
        self.release(svc, object);
        true
    }

    /// Drop every camera reference to an object leaving the scene. A live
    /// scene that loses its main camera picks another one.
    fn forget_camera(&mut self, svc: &mut Services, object: ObjectHandle) {
        self.cameras.retain(|c| *c != object);
        if self.start_camera != Some(object) {
            return;
        }
        self.start_camera = None;
        if self.is_instanced() {
            let camera = self.resolve_camera(svc);
            self.set_main_camera(svc, camera);
        }
    }

    /// Forget constraints on the object and deallocate it.
    pub(crate) fn release(&mut self, svc: &mut Services, object: ObjectHandle) {
        if let Some(constraints) = &mut self.constraints {
            constraints.notify_object_destroyed(object);
        }
        svc.directory.destroy(object);
    }

    /// Look up by name: the name map first, then any object this scene owns.
    pub fn get_object(&self, svc: &Services, name: &str) -> Option<ObjectHandle> {
        if let Some(handle) = self.objects.get(name) {
            return Some(*handle);
        }
        svc.directory.find_owned(name, self.id)
    }

    pub fn has_object(&self, svc: &Services, name: &str) -> bool {
        self.get_object(svc, name).is_some()
    }

    pub fn find_instanced_object(&self, svc: &Services, name: &str) -> Option<ObjectHandle> {
        self.get_object(svc, name)
            .filter(|h| svc.directory.is_instanced(*h))
    }

    /// Object factory. Refuses names already used in this scene.
    pub fn create_object(
        &mut self,
        svc: &mut Services,
        name: &str,
        kind: ObjectKind,
        transform: Transform,
    ) -> Option<ObjectHandle> {
        if self.has_object(svc, name) {
            tracing::warn!("Scene '{}': object '{}' already exists", self.name, name);
            return None;
        }
        let handle = svc
            .directory
            .create(name, kind, transform, ObjectProperties::default());
        self.add_object(svc, handle);
        Some(handle)
    }

    pub fn create_camera(&mut self, svc: &mut Services, name: &str) -> Option<ObjectHandle> {
        self.create_object(
            svc,
            name,
            ObjectKind::Camera(CameraData::default()),
            Transform::default(),
        )
    }

    pub fn create_light(&mut self, svc: &mut Services, name: &str) -> Option<ObjectHandle> {
        self.create_object(
            svc,
            name,
            ObjectKind::Light(LightData::default()),
            Transform::default(),
        )
    }

    pub fn create_entity(
        &mut self,
        svc: &mut Services,
        name: &str,
        mesh: Option<&str>,
    ) -> Option<ObjectHandle> {
        self.create_object(
            svc,
            name,
            ObjectKind::Entity(EntityData {
                mesh_name: mesh.map(str::to_string),
                ..Default::default()
            }),
            Transform::default(),
        )
    }

    pub fn create_skeleton(&mut self, svc: &mut Services, name: &str) -> Option<ObjectHandle> {
        self.create_object(
            svc,
            name,
            ObjectKind::Skeleton(SkeletonData::default()),
            Transform::default(),
        )
    }

    /// Add an empty mesh to the library, or return the existing one.
    pub fn create_mesh(&mut self, name: &str) -> &mut MeshData {
        self.meshes.entry(name.to_string()).or_default()
    }

    pub fn insert_mesh(&mut self, name: &str, mesh: MeshData) {
        if self.meshes.insert(name.to_string(), mesh).is_some() {
            tracing::debug!("Scene '{}': replaced mesh '{}'", self.name, name);
        }
    }

    pub fn get_mesh(&self, name: &str) -> Option<&MeshData> {
        self.meshes.get(name)
    }

    pub fn has_mesh(&self, name: &str) -> bool {
        self.meshes.contains_key(name)
    }

    pub fn layer_mask(&self) -> u32 {
        self.layers
    }

    /// Only objects on these layers are instanced.
    pub fn set_layer_mask(&mut self, layers: u32) {
        self.layers = layers;
    }

    /// Attach a constraint. Takes effect immediately if the object is live.
    pub fn add_constraint(
        &mut self,
        svc: &Services,
        object: ObjectHandle,
        constraint: Constraint,
    ) -> bool {
        if svc.directory.owner(object) != Some(self.id) {
            tracing::warn!("Scene '{}': constraint on a foreign object", self.name);
            return false;
        }
        let manager = self.constraints.get_or_insert_with(ConstraintManager::new);
        manager.add_constraint(object, constraint);
        if svc.directory.is_instanced(object) {
            manager.notify_instance_created(object);
        }
        true
    }

    pub fn world_color(&self) -> Vec3 {
        self.base.world_color
    }

    pub fn set_world_color(&mut self, svc: &mut Services, color: Vec3) {
        self.base.world_color = color;
        if let Some(viewport) = self.viewport {
            svc.renderer.set_background_color(viewport, color);
        }
    }

    pub fn ambient_color(&self) -> Vec3 {
        self.base.ambient_color
    }

    pub fn set_ambient_color(&mut self, svc: &mut Services, color: Vec3) {
        self.base.ambient_color = color;
        if let Some(context) = self.render_context {
            svc.renderer.set_ambient_light(context, color);
        }
    }

    pub fn gravity(&self) -> Vec3 {
        self.physics_world
            .as_ref()
            .map_or(self.base.gravity, |world| world.gravity())
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.base.gravity = gravity;
        if let Some(world) = &mut self.physics_world {
            world.set_gravity(gravity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::components::{PhysicsKind, SceneId};

    use crate::scene::testing::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let cube = entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);

        let twin = svc.directory.create(
            "Cube",
            ObjectKind::Empty,
            Transform::default(),
            ObjectProperties::default(),
        );
        assert!(!scene.add_object(svc, twin));
        assert_eq!(scene.object_count(), 1);
        assert_eq!(scene.get_object(svc, "Cube"), Some(cube));
        assert_eq!(svc.directory.owner(twin), None);

        assert!(scene.create_camera(svc, "Cube").is_none());
        assert_eq!(scene.object_count(), 1);
    }

    #[test]
    fn same_name_may_live_in_two_scenes() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut a = Scene::new(SceneId(1), "A");
        let mut b = Scene::new(SceneId(2), "B");
        let first = a.create_entity(svc, "Crate", None).unwrap();
        let second = b.create_entity(svc, "Crate", None).unwrap();
        assert_ne!(first, second);
        assert_eq!(a.get_object(svc, "Crate"), Some(first));
        assert_eq!(b.get_object(svc, "Crate"), Some(second));
    }

    #[test]
    fn foreign_objects_are_not_taken() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut a = Scene::new(SceneId(1), "A");
        let mut b = Scene::new(SceneId(2), "B");
        let crate_obj = a.create_entity(svc, "Crate", None).unwrap();
        assert!(!b.add_object(svc, crate_obj));
        assert!(!b.has_object(svc, "Crate"));
        assert_eq!(svc.directory.owner(crate_obj), Some(SceneId(1)));
    }

    #[test]
    fn owned_objects_resolve_without_map_entry() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let loose = svc.directory.create(
            "Loose",
            ObjectKind::Empty,
            Transform::default(),
            ObjectProperties::default(),
        );
        svc.directory.set_owner(loose, Some(scene.id()));
        assert_eq!(scene.object_count(), 0);
        assert_eq!(scene.get_object(svc, "Loose"), Some(loose));
        // Already owned, so adding is a no-op
        assert!(!scene.add_object(svc, loose));
        assert_eq!(scene.object_count(), 0);
    }

    #[test]
    fn destroy_object_requires_ownership() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let free = svc.directory.create(
            "Free",
            ObjectKind::Empty,
            Transform::default(),
            ObjectProperties::default(),
        );
        assert!(!scene.destroy_object(svc, free));
        assert!(svc.directory.contains(free));

        let cube = entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);
        assert!(scene.destroy_object(svc, cube));
        assert!(!svc.directory.contains(cube));
        assert!(!scene.has_object(svc, "Cube"));
    }

    #[test]
    fn erased_main_camera_is_replaced_in_a_live_scene() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let first = camera(&mut scene, svc, "First");
        let second = camera(&mut scene, svc, "Second");
        scene.instantiate(svc).unwrap();
        assert_eq!(scene.main_camera(), Some(first));

        assert!(scene.erase_object(svc, first));
        assert_eq!(svc.directory.owner(first), None);
        assert_eq!(scene.main_camera(), Some(second));
        assert_eq!(scene.cameras(), &[second]);
    }

    #[test]
    fn erased_main_camera_is_forgotten_while_uninstanced() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let cam = camera(&mut scene, svc, "Cam");
        entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);
        assert!(scene.set_main_camera(svc, cam));

        assert!(scene.erase_object(svc, cam));
        assert_eq!(scene.main_camera(), None);
        scene.instantiate(svc).unwrap();
        assert_ne!(scene.main_camera(), Some(cam));
        assert!(scene.has_object(svc, crate::scene::DEFAULT_CAMERA_NAME));
    }

    #[test]
    fn environment_is_cached_until_instanced() {
        let mut h = harness();
        let mut scene = scene();
        scene.set_world_color(&mut h.services, Vec3::new(0.1, 0.2, 0.3));
        scene.set_ambient_color(&mut h.services, Vec3::ONE);
        scene.set_gravity(Vec3::new(0.0, -1.0, 0.0));
        assert!(h.render.borrow().calls.is_empty());
        assert_eq!(scene.world_color(), Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(scene.gravity(), Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn mesh_library() {
        let mut scene = scene();
        assert!(!scene.has_mesh("Rock"));
        scene.create_mesh("Rock").vertices.push([0.0, 0.0, 0.0]);
        assert!(scene.has_mesh("Rock"));
        assert_eq!(scene.get_mesh("Rock").unwrap().vertices.len(), 1);
        scene.insert_mesh("Rock", MeshData::cube(1.0));
        assert_eq!(scene.get_mesh("Rock").unwrap().triangle_count(), 12);
    }
}
