use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::{Quat, Vec3};
use rapier3d::prelude::*;

use tessera_core::components::{
    Aabb, CollisionShape, MeshData, ObjectHandle, PhysicsKind, PhysicsProperties, SceneId,
    Transform,
};

use crate::collaborators::DebugLine;

/// Simulation-side handle of an object's collision/dynamics state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    RigidBody,
    Character,
}

/// Physics controller component attached to objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicsController {
    pub id: ControllerId,
    pub kind: ControllerKind,
}

/// Everything the physics world needs to build a controller. Owned copies,
/// so the world never reaches back into the object directory.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub owner: ObjectHandle,
    pub name: String,
    pub transform: Transform,
    pub physics: PhysicsProperties,
    pub mesh: Option<MeshData>,
}

/// Creates one dynamics world per instanced scene.
pub trait PhysicsDriver {
    fn create_world(&mut self, name: &str, scene: SceneId, gravity: Vec3) -> Box<dyn DynamicsWorld>;
}

/// A scene's physics world. Dropping it destroys the world.
pub trait DynamicsWorld {
    fn scene(&self) -> SceneId;
    fn step(&mut self, dt: f32);
    /// Clear the contacts gathered by the previous step.
    fn reset_contacts(&mut self);
    fn contacts(&self) -> Vec<(ObjectHandle, ObjectHandle)>;
    fn create_rigid_body(&mut self, desc: &BodyDesc) -> ControllerId;
    fn create_character(&mut self, desc: &BodyDesc) -> ControllerId;
    fn destroy_controller(&mut self, id: ControllerId) -> bool;
    fn is_static(&self, id: ControllerId) -> bool;
    fn bounding_box(&self, id: ControllerId) -> Aabb;
    fn controller_count(&self) -> usize;
    fn gravity(&self) -> Vec3;
    fn set_gravity(&mut self, gravity: Vec3);
    /// Poses of awake dynamic bodies after the last step.
    fn moved_bodies(&self) -> Vec<(ObjectHandle, Vec3, Quat)>;
    /// Rebuild the broad-phase query structure.
    fn refresh_spatial(&mut self, focus: Option<Vec3>);
    fn debug_lines(&self, out: &mut Vec<DebugLine>);
}

/// Counts live worlds created by a driver.
#[derive(Debug, Clone, Default)]
pub struct WorldCounter(Rc<Cell<usize>>);

impl WorldCounter {
    pub fn get(&self) -> usize {
        self.0.get()
    }
}

struct WorldToken(WorldCounter);

impl WorldToken {
    fn new(counter: &WorldCounter) -> Self {
        counter.0.set(counter.0.get() + 1);
        Self(counter.clone())
    }
}

impl Drop for WorldToken {
    fn drop(&mut self) {
        let live = &self.0 .0;
        live.set(live.get().saturating_sub(1));
    }
}

#[derive(Default)]
pub struct RapierDriver {
    live: WorldCounter,
}

impl RapierDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn world_counter(&self) -> WorldCounter {
        self.live.clone()
    }
}

impl PhysicsDriver for RapierDriver {
    fn create_world(&mut self, name: &str, scene: SceneId, gravity: Vec3) -> Box<dyn DynamicsWorld> {
        tracing::info!("Creating physics world for '{}'", name);
        Box::new(RapierWorld::new(scene, gravity, WorldToken::new(&self.live)))
    }
}

struct BodyEntry {
    body: RigidBodyHandle,
    collider: ColliderHandle,
}

/// Central physics world state.
pub struct RapierWorld {
    scene: SceneId,
    pub gravity: Vec3,
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_params: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub query_pipeline: QueryPipeline,

    controllers: HashMap<ControllerId, BodyEntry>,
    next_controller: u32,
    body_to_object: HashMap<RigidBodyHandle, ObjectHandle>,
    collider_to_object: HashMap<ColliderHandle, ObjectHandle>,

    // Contacts that started during the last step
    new_contacts: Vec<(ObjectHandle, ObjectHandle)>,
    active_contact_pairs: HashSet<[ColliderHandle; 2]>,

    _token: WorldToken,
}

impl RapierWorld {
    fn new(scene: SceneId, gravity: Vec3, token: WorldToken) -> Self {
        Self {
            scene,
            gravity,
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_params: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            controllers: HashMap::new(),
            next_controller: 0,
            body_to_object: HashMap::new(),
            collider_to_object: HashMap::new(),
            new_contacts: Vec::new(),
            active_contact_pairs: HashSet::new(),
            _token: token,
        }
    }

    fn insert(&mut self, owner: ObjectHandle, body: RigidBody, collider: Collider) -> ControllerId {
        let rb_handle = self.rigid_body_set.insert(body);
        let col_handle =
            self.collider_set
                .insert_with_parent(collider, rb_handle, &mut self.rigid_body_set);

        self.body_to_object.insert(rb_handle, owner);
        self.collider_to_object.insert(col_handle, owner);

        let id = ControllerId(self.next_controller);
        self.next_controller += 1;
        self.controllers.insert(
            id,
            BodyEntry {
                body: rb_handle,
                collider: col_handle,
            },
        );
        id
    }
}

impl DynamicsWorld for RapierWorld {
    fn scene(&self) -> SceneId {
        self.scene
    }

    fn step(&mut self, dt: f32) {
        self.integration_params.dt = dt;
        let gravity = vector![self.gravity.x, self.gravity.y, self.gravity.z];

        self.physics_pipeline.step(
            &gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        let mut current_pairs = HashSet::new();
        for pair in self.narrow_phase.contact_pairs() {
            if pair.has_any_active_contact {
                let key = [pair.collider1, pair.collider2];
                current_pairs.insert(key);

                if !self.active_contact_pairs.contains(&key) {
                    let a = self.collider_to_object.get(&pair.collider1).copied();
                    let b = self.collider_to_object.get(&pair.collider2).copied();
                    if let (Some(a), Some(b)) = (a, b) {
                        self.new_contacts.push((a, b));
                    }
                }
            }
        }
        self.active_contact_pairs = current_pairs;
    }

    fn reset_contacts(&mut self) {
        self.new_contacts.clear();
    }

    fn contacts(&self) -> Vec<(ObjectHandle, ObjectHandle)> {
        self.new_contacts.clone()
    }

    fn create_rigid_body(&mut self, desc: &BodyDesc) -> ControllerId {
        let t = &desc.transform;
        let builder = match desc.physics.kind {
            PhysicsKind::Static | PhysicsKind::NoCollision => RigidBodyBuilder::fixed(),
            // Dynamic objects translate but never rotate
            PhysicsKind::Dynamic => RigidBodyBuilder::dynamic().lock_rotations(),
            PhysicsKind::Rigid => RigidBodyBuilder::dynamic(),
        };
        let rb = builder
            .translation(vector![t.position.x, t.position.y, t.position.z])
            .rotation(quat_to_angvector(t.rotation))
            .build();

        let collider_builder = shape_to_collider(desc)
            .restitution(desc.physics.restitution)
            .friction(desc.physics.friction);
        let collider = if desc.physics.kind == PhysicsKind::Static {
            collider_builder.sensor(desc.physics.sensor).build()
        } else {
            collider_builder
                .mass(desc.physics.mass)
                .sensor(desc.physics.sensor)
                .build()
        };

        let id = self.insert(desc.owner, rb, collider);
        tracing::debug!("Rigid body {:?} for '{}'", id, desc.name);
        id
    }

    fn create_character(&mut self, desc: &BodyDesc) -> ControllerId {
        let t = &desc.transform;
        let rb = RigidBodyBuilder::kinematic_position_based()
            .translation(vector![t.position.x, t.position.y, t.position.z])
            .rotation(quat_to_angvector(t.rotation))
            .build();

        // Ghosts have no physical response
        let collider = shape_to_collider(desc).sensor(true).build();

        let id = self.insert(desc.owner, rb, collider);
        tracing::debug!("Character {:?} for '{}'", id, desc.name);
        id
    }

    fn destroy_controller(&mut self, id: ControllerId) -> bool {
        let Some(entry) = self.controllers.remove(&id) else {
            return false;
        };
        self.rigid_body_set.remove(
            entry.body,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.body_to_object.remove(&entry.body);
        self.collider_to_object.remove(&entry.collider);
        self.active_contact_pairs
            .retain(|pair| !pair.contains(&entry.collider));
        true
    }

    fn is_static(&self, id: ControllerId) -> bool {
        self.controllers
            .get(&id)
            .and_then(|entry| self.rigid_body_set.get(entry.body))
            .map_or(false, |body| body.is_fixed())
    }

    fn bounding_box(&self, id: ControllerId) -> Aabb {
        self.controllers
            .get(&id)
            .and_then(|entry| self.collider_set.get(entry.collider))
            .map_or(Aabb::NULL, collider_aabb)
    }

    fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    fn gravity(&self) -> Vec3 {
        self.gravity
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    fn moved_bodies(&self) -> Vec<(ObjectHandle, Vec3, Quat)> {
        let mut moved = Vec::new();
        for (rb_handle, &owner) in &self.body_to_object {
            if let Some(body) = self.rigid_body_set.get(*rb_handle) {
                if !body.is_dynamic() || body.is_sleeping() {
                    continue;
                }
                let pos = body.position().translation;
                let rot = body.position().rotation;
                moved.push((
                    owner,
                    Vec3::new(pos.x, pos.y, pos.z),
                    Quat::from_xyzw(rot.i, rot.j, rot.k, rot.w),
                ));
            }
        }
        moved
    }

    fn refresh_spatial(&mut self, focus: Option<Vec3>) {
        tracing::trace!("Refreshing query pipeline around {:?}", focus);
        self.query_pipeline.update(&self.collider_set);
    }

    fn debug_lines(&self, out: &mut Vec<DebugLine>) {
        for entry in self.controllers.values() {
            let Some(collider) = self.collider_set.get(entry.collider) else {
                continue;
            };
            let fixed = self
                .rigid_body_set
                .get(entry.body)
                .map_or(false, |b| b.is_fixed());
            let color = if fixed {
                Vec3::new(0.0, 1.0, 0.0)
            } else {
                Vec3::ONE
            };
            for (from, to) in collider_aabb(collider).edges() {
                out.push(DebugLine { from, to, color });
            }
        }
    }
}

fn collider_aabb(collider: &Collider) -> Aabb {
    let aabb = collider.compute_aabb();
    Aabb::new(
        Vec3::new(aabb.mins.x, aabb.mins.y, aabb.mins.z),
        Vec3::new(aabb.maxs.x, aabb.maxs.y, aabb.maxs.z),
    )
}

fn shape_to_collider(desc: &BodyDesc) -> ColliderBuilder {
    let scale = desc.transform.scale.abs();
    match &desc.physics.shape {
        CollisionShape::Box { half_extents } => ColliderBuilder::cuboid(
            half_extents[0] * scale.x,
            half_extents[1] * scale.y,
            half_extents[2] * scale.z,
        ),
        CollisionShape::Sphere { radius } => ColliderBuilder::ball(*radius * scale.max_element()),
        CollisionShape::Capsule {
            half_height,
            radius,
        } => ColliderBuilder::capsule_y(*half_height * scale.y, *radius * scale.x.max(scale.z)),
        CollisionShape::ConvexHull | CollisionShape::Mesh => {
            let points: Vec<Point<Real>> = desc
                .mesh
                .iter()
                .flat_map(|m| m.points())
                .map(|p| {
                    let p = p * scale;
                    point![p.x, p.y, p.z]
                })
                .collect();
            ColliderBuilder::convex_hull(&points).unwrap_or_else(|| {
                // Degenerate point cloud: fall back to its bounds
                let bounds = Aabb::from_points(points.iter().map(|p| Vec3::new(p.x, p.y, p.z)));
                let half = if bounds.is_null() {
                    Vec3::splat(0.5)
                } else {
                    bounds.half_extents().max(Vec3::splat(0.01))
                };
                ColliderBuilder::cuboid(half.x, half.y, half.z)
            })
        }
    }
}

fn quat_to_angvector(q: Quat) -> rapier3d::na::Vector3<f32> {
    let (axis, angle) = q.to_axis_angle();
    vector![axis.x * angle, axis.y * angle, axis.z * angle]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(owner: ObjectHandle, kind: PhysicsKind, position: Vec3) -> BodyDesc {
        BodyDesc {
            owner,
            name: "body".to_string(),
            transform: Transform::from_position(position),
            physics: PhysicsProperties {
                kind,
                ..Default::default()
            },
            mesh: None,
        }
    }

    fn handle() -> ObjectHandle {
        let mut world = hecs::World::new();
        ObjectHandle(world.spawn(()))
    }

    #[test]
    fn worlds_are_counted_until_dropped() {
        let mut driver = RapierDriver::new();
        let counter = driver.world_counter();
        let world = driver.create_world("Level", SceneId(1), Vec3::new(0.0, -9.81, 0.0));
        assert_eq!(counter.get(), 1);
        assert_eq!(world.controller_count(), 0);
        drop(world);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn static_body_reports_bounds() {
        let mut driver = RapierDriver::new();
        let mut world = driver.create_world("Level", SceneId(1), Vec3::new(0.0, -9.81, 0.0));
        let id = world.create_rigid_body(&desc(handle(), PhysicsKind::Static, Vec3::new(2.0, 0.0, 0.0)));

        assert!(world.is_static(id));
        let bounds = world.bounding_box(id);
        assert!((bounds.min - Vec3::new(1.5, -0.5, -0.5)).length() < 1e-4);
        assert!((bounds.max - Vec3::new(2.5, 0.5, 0.5)).length() < 1e-4);

        assert!(world.destroy_controller(id));
        assert!(!world.destroy_controller(id));
        assert!(world.bounding_box(id).is_null());
    }

    #[test]
    fn dynamic_body_falls_and_reports_motion() {
        let mut driver = RapierDriver::new();
        let mut world = driver.create_world("Level", SceneId(1), Vec3::new(0.0, -9.81, 0.0));
        let owner = handle();
        let id = world.create_rigid_body(&desc(owner, PhysicsKind::Rigid, Vec3::new(0.0, 10.0, 0.0)));
        assert!(!world.is_static(id));

        for _ in 0..10 {
            world.step(1.0 / 60.0);
        }
        let moved = world.moved_bodies();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].0, owner);
        assert!(moved[0].1.y < 10.0);
    }

    #[test]
    fn character_is_kinematic() {
        let mut driver = RapierDriver::new();
        let mut world = driver.create_world("Level", SceneId(1), Vec3::ZERO);
        let mut ghost = desc(handle(), PhysicsKind::Dynamic, Vec3::ZERO);
        ghost.physics.ghost = true;
        let id = world.create_character(&ghost);
        assert!(!world.is_static(id));
        world.step(1.0 / 60.0);
        assert!(world.moved_bodies().is_empty());
    }

    #[test]
    fn mesh_shape_uses_hull_of_vertices() {
        let mut driver = RapierDriver::new();
        let mut world = driver.create_world("Level", SceneId(1), Vec3::ZERO);
        let mut body = desc(handle(), PhysicsKind::Static, Vec3::ZERO);
        body.physics.shape = CollisionShape::Mesh;
        body.mesh = Some(MeshData::cube(2.0));
        let id = world.create_rigid_body(&body);
        let bounds = world.bounding_box(id);
        assert!((bounds.max - Vec3::splat(2.0)).length() < 1e-3);
    }

    #[test]
    fn debug_lines_cover_every_controller() {
        let mut driver = RapierDriver::new();
        let mut world = driver.create_world("Level", SceneId(1), Vec3::ZERO);
        world.create_rigid_body(&desc(handle(), PhysicsKind::Static, Vec3::ZERO));
        world.create_rigid_body(&desc(handle(), PhysicsKind::Rigid, Vec3::Y));
        let mut lines = Vec::new();
        world.debug_lines(&mut lines);
        assert_eq!(lines.len(), 24);
    }
}
