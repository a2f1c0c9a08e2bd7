//! Engine-wide services handed to scenes on every lifecycle call.

use tessera_core::components::SceneId;
use tessera_core::events::EventBus;

use crate::collaborators::{AudioSystem, FrameStats, GroupInstancer, LogicSystem, RenderBackend, WindowSystem};
use crate::config::EngineConfig;
use crate::directory::ObjectDirectory;
use crate::physics::PhysicsDriver;

pub struct Services {
    pub config: EngineConfig,
    pub directory: ObjectDirectory,
    pub renderer: Box<dyn RenderBackend>,
    pub physics: Box<dyn PhysicsDriver>,
    pub groups: Box<dyn GroupInstancer>,
    pub logic: Box<dyn LogicSystem>,
    pub audio: Box<dyn AudioSystem>,
    pub window: Box<dyn WindowSystem>,
    pub stats: Box<dyn FrameStats>,
    pub events: EventBus,
    /// The scene currently driving the viewport.
    pub active_scene: Option<SceneId>,
}

impl Services {
    /// Replace the logic system, unloading whatever the old one held.
    pub fn set_logic(&mut self, logic: Box<dyn LogicSystem>) {
        self.logic.unload_scripts();
        self.logic = logic;
    }
}
