use std::collections::{HashMap, HashSet};

use glam::Vec3;
use tessera_core::components::ObjectHandle;

use crate::directory::ObjectDirectory;

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Clamp the position into a box.
    LimitLocation { min: Vec3, max: Vec3, influence: f32 },
    /// Follow another object's position at an offset.
    CopyLocation {
        target: ObjectHandle,
        offset: Vec3,
        influence: f32,
    },
}

impl Constraint {
    fn solve(&self, position: Vec3, directory: &ObjectDirectory) -> Option<Vec3> {
        let (goal, influence) = match self {
            Constraint::LimitLocation {
                min,
                max,
                influence,
            } => (position.clamp(*min, *max), *influence),
            Constraint::CopyLocation {
                target,
                offset,
                influence,
            } => {
                if !directory.is_instanced(*target) {
                    return None;
                }
                (directory.world_transform(*target)?.position + *offset, *influence)
            }
        };
        Some(position.lerp(goal, influence.clamp(0.0, 1.0)))
    }

    fn references(&self, handle: ObjectHandle) -> bool {
        matches!(self, Constraint::CopyLocation { target, .. } if *target == handle)
    }
}

/// Per-scene constraint set. Only constraints of instanced objects are
/// evaluated.
#[derive(Debug, Default)]
pub struct ConstraintManager {
    constraints: HashMap<ObjectHandle, Vec<Constraint>>,
    active: HashSet<ObjectHandle>,
}

impl ConstraintManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_constraint(&mut self, object: ObjectHandle, constraint: Constraint) {
        self.constraints.entry(object).or_default().push(constraint);
    }

    pub fn has_constraints(&self, object: ObjectHandle) -> bool {
        self.constraints.get(&object).map_or(false, |c| !c.is_empty())
    }

    pub fn is_active(&self, object: ObjectHandle) -> bool {
        self.active.contains(&object)
    }

    pub fn len(&self) -> usize {
        self.constraints.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_instance_created(&mut self, object: ObjectHandle) {
        if self.has_constraints(object) {
            self.active.insert(object);
        }
    }

    pub fn notify_instance_destroyed(&mut self, object: ObjectHandle) {
        self.active.remove(&object);
    }

    /// Forget every constraint on or targeting `object`.
    pub fn notify_object_destroyed(&mut self, object: ObjectHandle) {
        self.active.remove(&object);
        self.constraints.remove(&object);
        for list in self.constraints.values_mut() {
            list.retain(|c| !c.references(object));
        }
        self.constraints.retain(|_, list| !list.is_empty());
    }

    /// Apply constraints of active objects. Returns the objects moved.
    pub fn update(&mut self, directory: &mut ObjectDirectory) -> Vec<ObjectHandle> {
        let mut moved = Vec::new();
        for object in &self.active {
            let Some(mut transform) = directory.transform(*object) else {
                continue;
            };
            let start = transform.position;
            for constraint in self.constraints.get(object).into_iter().flatten() {
                if let Some(position) = constraint.solve(transform.position, directory) {
                    transform.position = position;
                }
            }
            if transform.position != start {
                directory.set_transform(*object, transform);
                moved.push(*object);
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::components::{ObjectKind, ObjectProperties, Transform};

    use crate::collaborators::VisualId;

    fn spawn(directory: &mut ObjectDirectory, name: &str, position: Vec3) -> ObjectHandle {
        let h = directory.create(
            name,
            ObjectKind::Empty,
            Transform::from_position(position),
            ObjectProperties::default(),
        );
        directory.set_instance(h, VisualId(0));
        h
    }

    #[test]
    fn inactive_constraints_are_not_applied() {
        let mut directory = ObjectDirectory::new();
        let ball = spawn(&mut directory, "Ball", Vec3::new(5.0, 0.0, 0.0));
        let mut manager = ConstraintManager::new();
        manager.add_constraint(
            ball,
            Constraint::LimitLocation {
                min: Vec3::splat(-1.0),
                max: Vec3::splat(1.0),
                influence: 1.0,
            },
        );
        assert!(manager.update(&mut directory).is_empty());

        manager.notify_instance_created(ball);
        assert_eq!(manager.update(&mut directory), vec![ball]);
        assert_eq!(directory.transform(ball).unwrap().position, Vec3::new(1.0, 0.0, 0.0));

        manager.notify_instance_destroyed(ball);
        assert!(!manager.is_active(ball));
    }

    #[test]
    fn copy_location_follows_target_with_influence() {
        let mut directory = ObjectDirectory::new();
        let follower = spawn(&mut directory, "Follower", Vec3::ZERO);
        let leader = spawn(&mut directory, "Leader", Vec3::new(4.0, 0.0, 0.0));
        let mut manager = ConstraintManager::new();
        manager.add_constraint(
            follower,
            Constraint::CopyLocation {
                target: leader,
                offset: Vec3::new(0.0, 2.0, 0.0),
                influence: 0.5,
            },
        );
        manager.notify_instance_created(follower);
        manager.update(&mut directory);
        assert_eq!(
            directory.transform(follower).unwrap().position,
            Vec3::new(2.0, 1.0, 0.0)
        );
    }

    #[test]
    fn destroying_target_drops_dependent_constraints() {
        let mut directory = ObjectDirectory::new();
        let follower = spawn(&mut directory, "Follower", Vec3::ZERO);
        let leader = spawn(&mut directory, "Leader", Vec3::ONE);
        let mut manager = ConstraintManager::new();
        manager.add_constraint(
            follower,
            Constraint::CopyLocation {
                target: leader,
                offset: Vec3::ZERO,
                influence: 1.0,
            },
        );
        assert_eq!(manager.len(), 1);
        manager.notify_object_destroyed(leader);
        assert!(manager.is_empty());
        assert!(!manager.has_constraints(follower));
    }
}
