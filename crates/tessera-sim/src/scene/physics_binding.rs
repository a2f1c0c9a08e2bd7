use tessera_core::components::{
    Aabb, MeshData, ObjectHandle, ObjectKind, PhysicsKind, PhysicsProperties,
};

use super::{InstanceState, Scene};
use crate::context::Services;
use crate::physics::{BodyDesc, ControllerKind, DynamicsWorld, PhysicsController};

impl Scene {
    /// The scene's physics world, created on first use.
    pub fn dynamics_world(&mut self, svc: &mut Services) -> &mut dyn DynamicsWorld {
        let (name, id, gravity) = (&self.name, self.id, self.base.gravity);
        self.physics_world
            .get_or_insert_with(|| svc.physics.create_world(name, id, gravity))
            .as_mut()
    }

    pub fn physics_world(&self) -> Option<&dyn DynamicsWorld> {
        self.physics_world.as_deref()
    }

    pub fn has_physics_world(&self) -> bool {
        self.physics_world.is_some()
    }

    /// Union of the bounding boxes of all static controllers.
    pub fn static_bounds(&self) -> Aabb {
        self.limits
    }

    pub fn static_controller_count(&self) -> usize {
        self.static_controllers.len()
    }

    /// Collision mesh of an entity: inline, else from the mesh library.
    fn collision_mesh(&self, svc: &Services, object: ObjectHandle) -> Option<MeshData> {
        let kind = svc.directory.kind(object)?;
        let ObjectKind::Entity(entity) = &*kind else {
            return None;
        };
        let mesh = match &entity.mesh {
            Some(inline) => Some(inline.clone()),
            None => entity
                .mesh_name
                .as_ref()
                .and_then(|n| self.meshes.get(n).cloned()),
        };
        mesh
    }

    /// Give an instanced object its physics controller, replacing any
    /// existing one. Parented objects are skipped.
    pub fn create_physics_object(&mut self, svc: &mut Services, object: ObjectHandle) {
        let Some(physics) = svc.directory.properties(object).map(|p| p.physics.clone()) else {
            return;
        };
        if !physics.is_physics_object() || svc.directory.parent(object).is_some() {
            return;
        }
        let kind = if physics.ghost {
            ControllerKind::Character
        } else {
            ControllerKind::RigidBody
        };
        self.attach_controller(svc, object, physics, kind);
    }

    /// Re-author an object's physics and rebuild it as a rigid body, even
    /// when the new properties ask for a ghost. The object must be live and
    /// owned by this scene.
    pub fn create_rigid_body(
        &mut self,
        svc: &mut Services,
        object: ObjectHandle,
        physics: PhysicsProperties,
    ) -> bool {
        if svc.directory.owner(object) != Some(self.id) || !svc.directory.is_instanced(object) {
            tracing::warn!(
                "Scene '{}': no live object '{}' for a rigid body",
                self.name,
                svc.directory.name(object).unwrap_or_default()
            );
            return false;
        }
        match svc.directory.properties_mut(object) {
            Some(mut props) => props.physics = physics.clone(),
            None => return false,
        }
        self.attach_controller(svc, object, physics, ControllerKind::RigidBody)
    }

    fn attach_controller(
        &mut self,
        svc: &mut Services,
        object: ObjectHandle,
        physics: PhysicsProperties,
        kind: ControllerKind,
    ) -> bool {
        let Some(name) = svc.directory.name(object) else {
            return false;
        };

        let mesh = self.collision_mesh(svc, object);
        if physics.shape.is_mesh_based() && mesh.as_ref().map_or(0, MeshData::triangle_count) == 0
        {
            tracing::warn!(
                "Object '{}' has a mesh collision shape without triangles, disabling collision",
                name
            );
            if let Some(mut props) = svc.directory.properties_mut(object) {
                props.physics.kind = PhysicsKind::NoCollision;
            }
            self.destroy_physics_object(svc, object);
            return false;
        }

        let Some(transform) = svc.directory.world_transform(object) else {
            return false;
        };
        let desc = BodyDesc {
            owner: object,
            name,
            transform,
            physics,
            mesh,
        };

        let previous = svc.directory.take_controller(object);
        let replaced_static = previous.map_or(false, |old| self.static_controllers.remove(&old.id));

        let world = self.dynamics_world(svc);
        if let Some(old) = previous {
            world.destroy_controller(old.id);
        }
        let id = match kind {
            ControllerKind::Character => world.create_character(&desc),
            ControllerKind::RigidBody => world.create_rigid_body(&desc),
        };
        let is_static = world.is_static(id) && desc.physics.kind == PhysicsKind::Static;
        let bounds = world.bounding_box(id);

        svc.directory
            .set_controller(object, PhysicsController { id, kind });
        if replaced_static {
            self.calculate_limits();
        }
        if is_static {
            self.static_controllers.insert(id);
            self.limits.merge(&bounds);
        }
        true
    }

    /// Detach and destroy an object's controller. During teardown only the
    /// binding is dropped; the world goes away as a whole.
    pub fn destroy_physics_object(&mut self, svc: &mut Services, object: ObjectHandle) {
        let Some(controller) = svc.directory.take_controller(object) else {
            return;
        };
        if self.state == InstanceState::Destroying {
            return;
        }

        let was_static = self.static_controllers.remove(&controller.id);
        if let Some(world) = &mut self.physics_world {
            world.destroy_controller(controller.id);
        }
        if was_static {
            self.calculate_limits();
        }
    }

    /// Recompute the static aggregate from scratch.
    pub fn calculate_limits(&mut self) {
        self.limits = Aabb::NULL;
        let Some(world) = &self.physics_world else {
            return;
        };
        for id in &self.static_controllers {
            self.limits.merge(&world.bounding_box(*id));
        }
    }
}
