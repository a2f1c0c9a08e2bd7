use tessera_core::components::ObjectHandle;

use crate::collaborators::FrameStage;
use crate::context::Services;

use super::Scene;

impl Scene {
    /// Start-of-frame housekeeping: flush ended objects, clear the contact
    /// cache, reclaim finished sounds.
    pub fn begin_frame(&mut self, svc: &mut Services) {
        if !self.is_instanced() {
            return;
        }
        self.end_objects(svc);
        if let Some(world) = &mut self.physics_world {
            world.reset_contacts();
        }
        svc.audio.collect_garbage();
    }

    /// Advance the simulation by one tick. The stage order is fixed.
    pub fn update(&mut self, svc: &mut Services, tick_rate: f32) {
        if !self.is_instanced() {
            return;
        }

        svc.stats.start_clock(FrameStage::Physics);
        if let Some(world) = &mut self.physics_world {
            world.step(tick_rate);
        }
        self.sync_physics(svc);
        svc.stats.stop(FrameStage::Physics);

        svc.stats.start_clock(FrameStage::Constraints);
        let constrained = match &mut self.constraints {
            Some(constraints) => constraints.update(&mut svc.directory),
            None => Vec::new(),
        };
        for object in constrained {
            self.object_moved(svc, object);
        }
        svc.stats.stop(FrameStage::Constraints);

        svc.stats.start_clock(FrameStage::LogicBricks);
        svc.logic.update_bricks(tick_rate);
        svc.stats.stop(FrameStage::LogicBricks);

        svc.stats.start_clock(FrameStage::LogicNodes);
        svc.logic.update_nodes(tick_rate);
        svc.stats.stop(FrameStage::LogicNodes);

        svc.stats.start_clock(FrameStage::Sound);
        let listener = self
            .start_camera
            .and_then(|camera| svc.directory.world_transform(camera));
        svc.audio.update(listener.as_ref());
        svc.stats.stop(FrameStage::Sound);

        svc.stats.start_clock(FrameStage::Dbvt);
        if self.mark_dbvt {
            self.mark_dbvt = false;
            let focus = listener.map(|t| t.position);
            if let Some(world) = &mut self.physics_world {
                world.refresh_spatial(focus);
            }
        }
        svc.stats.stop(FrameStage::Dbvt);

        svc.stats.start_clock(FrameStage::DebugDraw);
        if let (Some(debugger), Some(context)) = (&mut self.debugger, self.render_context) {
            if let Some(world) = &self.physics_world {
                debugger.draw_physics(world.as_ref());
            }
            debugger.flush(svc.renderer.as_mut(), context);
        }
        svc.stats.stop(FrameStage::DebugDraw);

        svc.stats.start_clock(FrameStage::Clones);
        self.tick_clones(svc);
        svc.stats.stop(FrameStage::Clones);

        svc.stats.start_clock(FrameStage::EndObjects);
        self.end_objects(svc);
        svc.stats.stop(FrameStage::EndObjects);

        self.frame += 1;
    }

    /// Copy the poses of moving bodies back onto their objects.
    fn sync_physics(&mut self, svc: &mut Services) {
        let Some(world) = &self.physics_world else {
            return;
        };
        let moved = world.moved_bodies();
        for (object, position, rotation) in moved {
            let Some(mut transform) = svc.directory.transform(object) else {
                continue;
            };
            transform.position = position;
            transform.rotation = rotation;
            svc.directory.set_transform(object, transform);
            self.object_moved(svc, object);
        }
    }

    /// Push a changed transform out to the visual and the spatial caches.
    fn object_moved(&mut self, svc: &mut Services, object: ObjectHandle) {
        if let (Some(visual), Some(transform)) =
            (svc.directory.visual(object), svc.directory.world_transform(object))
        {
            svc.renderer.set_visual_transform(visual, &transform);
        }
        if let Some(navigation) = &mut self.navigation {
            if navigation.contains(object) {
                navigation.update_or_create(object, &svc.directory, &self.meshes);
            }
        }
        self.mark_dbvt = true;
    }
}
