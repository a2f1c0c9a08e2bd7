//! Physics debug drawing.

use crate::collaborators::{DebugLine, RenderBackend, RenderContextId};
use crate::physics::DynamicsWorld;

#[derive(Debug, Default)]
pub struct PhysicsDebugger {
    lines: Vec<DebugLine>,
    flushed_frames: u64,
}

impl PhysicsDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gather collider outlines from the world.
    pub fn draw_physics(&mut self, world: &dyn DynamicsWorld) {
        world.debug_lines(&mut self.lines);
    }

    pub fn pending(&self) -> usize {
        self.lines.len()
    }

    pub fn flushed_frames(&self) -> u64 {
        self.flushed_frames
    }

    /// Hand the collected lines to the renderer and start a new batch.
    pub fn flush(&mut self, renderer: &mut dyn RenderBackend, context: RenderContextId) -> usize {
        let count = self.lines.len();
        if count > 0 {
            renderer.draw_lines(context, &self.lines);
        }
        self.lines.clear();
        self.flushed_frames += 1;
        count
    }
}
