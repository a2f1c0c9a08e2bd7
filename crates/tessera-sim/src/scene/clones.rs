use tessera_core::components::{LifeSpan, ObjectHandle};
use tessera_core::events::LifecycleKind;

use super::Scene;
use crate::context::Services;

impl Scene {
    /// Spawn a copy of `source` under a fresh name.
    ///
    /// With `life_span > 0` the clone is ended automatically on the frame its
    /// tick count first exceeds `life_span`; otherwise it lives until ended
    /// explicitly or the scene is torn down.
    pub fn clone_object(
        &mut self,
        svc: &mut Services,
        source: ObjectHandle,
        life_span: i32,
        instantiate: bool,
    ) -> Option<ObjectHandle> {
        let Some(base) = svc.directory.name(source) else {
            tracing::warn!("Scene '{}': cannot clone a deallocated object", self.name);
            return None;
        };
        let name = self.unique_clone_name(svc, &base);
        let clone = svc.directory.duplicate(source, &name)?;
        // Clones are never linked, so they start where the source is now
        if let Some(world) = svc.directory.world_transform(source) {
            svc.directory.set_authored(clone, world);
        }

        if let Some(mut props) = svc.directory.properties_mut(clone) {
            props.active_layer = true;
        }
        svc.directory.set_life_span(clone, LifeSpan::new(life_span));
        if svc.directory.owner(clone) != Some(self.id) {
            svc.directory.set_owner(clone, Some(self.id));
        }

        if life_span > 0 {
            self.tick_clones.push(clone);
        } else {
            self.clones.push(clone);
        }
        svc.events
            .emit(LifecycleKind::CloneCreated, &self.name, Some(name.as_str()));

        if instantiate {
            self.create_object_instance(svc, clone);
        }
        Some(clone)
    }

    fn unique_clone_name(&mut self, svc: &Services, base: &str) -> String {
        loop {
            self.clone_counter += 1;
            let name = format!("{}.{:03}", base, self.clone_counter);
            if !self.has_object(svc, &name) {
                return name;
            }
        }
    }

    /// Count one frame on every ticking clone and queue the expired ones.
    pub fn tick_clones(&mut self, svc: &mut Services) {
        if self.tick_clones.is_empty() {
            return;
        }
        let expired: Vec<ObjectHandle> = self
            .tick_clones
            .iter()
            .copied()
            .filter(|clone| svc.directory.advance_life_span(*clone))
            .collect();
        for clone in expired {
            let name = svc.directory.name(clone);
            svc.events
                .emit(LifecycleKind::CloneExpired, &self.name, name.as_deref());
            self.end_object(clone);
        }
    }

    /// Queue an object for destruction at the next frame boundary.
    pub fn end_object(&mut self, object: ObjectHandle) {
        if !self.end_objects.contains(&object) {
            self.end_objects.push(object);
        }
    }

    /// Flush the destruction queue.
    pub fn end_objects(&mut self, svc: &mut Services) {
        if self.end_objects.is_empty() {
            return;
        }
        for object in std::mem::take(&mut self.end_objects) {
            self.unload_and_destroy(svc, object);
        }
    }

    /// Destroy the runtime representation of an ended object. Clones are
    /// also deallocated; group members stay for their group to manage.
    fn unload_and_destroy(&mut self, svc: &mut Services, object: ObjectHandle) {
        if !svc.directory.contains(object) {
            return;
        }
        self.destroy_object_instance(svc, object);
        if !svc.directory.is_clone(object) {
            return;
        }

        if let Some(pos) = self.clones.iter().position(|c| *c == object) {
            self.clones.remove(pos);
        } else if let Some(pos) = self.tick_clones.iter().position(|c| *c == object) {
            self.tick_clones.remove(pos);
        } else {
            if !svc.directory.is_group_member(object) {
                panic!(
                    "clone '{}' is not tracked by scene '{}'",
                    svc.directory.name(object).unwrap_or_default(),
                    self.name
                );
            }
            return;
        }
        self.release(svc, object);
    }

    /// Destroy every clone. Resets the clone name counter.
    pub fn destroy_clones(&mut self, svc: &mut Services) {
        let clones: Vec<ObjectHandle> = self
            .clones
            .drain(..)
            .chain(self.tick_clones.drain(..))
            .collect();
        for clone in clones {
            self.destroy_object_instance(svc, clone);
            self.release(svc, clone);
        }
        self.clone_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use tessera_core::components::{GroupMember, PhysicsKind};

    use super::*;
    use crate::scene::testing::*;

    #[test]
    fn clone_names_are_unique() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let cube = entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);
        // Occupy the first generated name
        entity(&mut scene, svc, "Cube.001", Vec3::ZERO, PhysicsKind::NoCollision);

        let clone = scene.clone_object(svc, cube, 0, false).unwrap();
        assert_eq!(svc.directory.name(clone).as_deref(), Some("Cube.002"));
        assert_eq!(svc.directory.owner(clone), Some(scene.id()));
        assert!(scene.has_object(svc, "Cube.002"));
        assert_eq!(scene.clone_count(), 1);
        assert!(!svc.directory.is_instanced(clone));
    }

    #[test]
    fn clone_expires_the_frame_after_its_budget() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let cube = entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);
        scene.instantiate(svc).unwrap();

        let clone = scene.clone_object(svc, cube, 5, true).unwrap();
        assert!(svc.directory.is_instanced(clone));
        for _ in 0..5 {
            scene.begin_frame(svc);
            scene.update(svc, 1.0 / 60.0);
        }
        assert!(scene.has_object(svc, "Cube.001"));
        assert_eq!(svc.directory.life_span(clone).unwrap().tick, 5);

        scene.begin_frame(svc);
        scene.update(svc, 1.0 / 60.0);
        assert!(!scene.has_object(svc, "Cube.001"));
        assert!(!svc.directory.contains(clone));
        assert!(h.render.borrow().visual_named("Cube.001").is_none());
        assert_eq!(scene.clone_count(), 0);
    }

    #[test]
    fn permanent_clones_are_never_ticked() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let cube = entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);
        scene.instantiate(svc).unwrap();

        let clone = scene.clone_object(svc, cube, 0, true).unwrap();
        for _ in 0..20 {
            scene.update(svc, 1.0 / 60.0);
        }
        assert!(svc.directory.contains(clone));
        assert_eq!(svc.directory.life_span(clone).unwrap().tick, 0);

        scene.end_object(clone);
        scene.end_object(clone);
        assert_eq!(scene.pending_end_objects(), 1);
        scene.end_objects(svc);
        assert!(!svc.directory.contains(clone));
    }

    #[test]
    fn clones_of_children_spawn_at_the_world_position() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        entity(&mut scene, svc, "Body", Vec3::new(1.0, 0.0, 0.0), PhysicsKind::NoCollision);
        let arm = entity(&mut scene, svc, "Arm", Vec3::new(1.0, 2.0, 0.0), PhysicsKind::NoCollision);
        svc.directory.properties_mut(arm).unwrap().parent_name = Some("Body".to_string());
        scene.instantiate(svc).unwrap();

        let clone = scene.clone_object(svc, arm, 0, true).unwrap();
        assert_eq!(svc.directory.parent(clone), None);
        let t = svc.directory.transform(clone).unwrap();
        assert!((t.position - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn clones_follow_a_moving_source() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let ball = entity(&mut scene, svc, "Ball", Vec3::new(0.0, 5.0, 0.0), PhysicsKind::Rigid);
        scene.instantiate(svc).unwrap();
        for _ in 0..20 {
            scene.update(svc, 1.0 / 60.0);
        }
        let now = svc.directory.transform(ball).unwrap().position;
        assert!(now.y < 5.0);

        let clone = scene.clone_object(svc, ball, 0, true).unwrap();
        assert_eq!(svc.directory.transform(clone).unwrap().position, now);
    }

    #[test]
    fn ended_regular_objects_are_only_hidden() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let cube = entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);
        scene.instantiate(svc).unwrap();

        scene.end_object(cube);
        scene.end_objects(svc);
        assert!(svc.directory.contains(cube));
        assert!(!svc.directory.is_instanced(cube));
        assert!(scene.has_object(svc, "Cube"));
    }

    #[test]
    fn ended_group_members_survive() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let cube = entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);
        let member = svc.directory.duplicate(cube, "Fence/Cube").unwrap();
        svc.directory.set_owner(member, Some(scene.id()));
        svc.directory.mark_group_member(
            member,
            GroupMember {
                group: "Fence".to_string(),
                placement: "Fence".to_string(),
            },
        );

        scene.end_object(member);
        scene.end_objects(svc);
        assert!(svc.directory.contains(member));
    }

    #[test]
    #[should_panic(expected = "not tracked")]
    fn untracked_clone_is_fatal() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let cube = entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);
        let stray = svc.directory.duplicate(cube, "Stray").unwrap();
        scene.end_object(stray);
        scene.end_objects(svc);
    }

    #[test]
    fn destroy_clones_resets_the_counter() {
        let mut h = harness();
        let svc = &mut h.services;
        let mut scene = scene();
        let cube = entity(&mut scene, svc, "Cube", Vec3::ZERO, PhysicsKind::NoCollision);
        let a = scene.clone_object(svc, cube, 0, false).unwrap();
        let b = scene.clone_object(svc, cube, 3, false).unwrap();
        scene.destroy_clones(svc);
        assert!(!svc.directory.contains(a));
        assert!(!svc.directory.contains(b));
        assert_eq!(scene.clone_count(), 0);

        let c = scene.clone_object(svc, cube, 0, false).unwrap();
        assert_eq!(svc.directory.name(c).as_deref(), Some("Cube.001"));
    }
}
