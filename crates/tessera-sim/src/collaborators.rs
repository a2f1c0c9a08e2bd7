//! Interfaces of the subsystems a scene drives but does not own the
//! internals of: rendering, grouping, logic, audio, windowing and stats.

use glam::Vec3;

use tessera_core::components::{
    CameraData, LightData, ObjectHandle, SceneId, Transform,
};
use tessera_core::environment::{FogParams, ShadowTechnique, SkyParams, SoundProps, ViewportOrientation};

use crate::directory::ObjectDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderContextId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(pub u64);

/// What the renderer should build for one object.
#[derive(Debug, Clone, Copy)]
pub enum VisualKind<'a> {
    Camera(&'a CameraData),
    Light(&'a LightData),
    Mesh {
        mesh: Option<&'a str>,
        material: &'a str,
    },
    Skeleton {
        bones: &'a [String],
    },
    Node,
}

#[derive(Debug, Clone, Copy)]
pub struct VisualDesc<'a> {
    pub name: &'a str,
    pub kind: VisualKind<'a>,
    pub transform: Transform,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugLine {
    pub from: Vec3,
    pub to: Vec3,
    pub color: Vec3,
}

/// Scene-graph side of the renderer.
pub trait RenderBackend {
    fn create_context(&mut self, name: &str) -> RenderContextId;
    fn destroy_context(&mut self, context: RenderContextId);
    fn set_skybox(&mut self, context: RenderContextId, sky: &SkyParams);
    fn set_ambient_light(&mut self, context: RenderContextId, color: Vec3);
    fn set_fog(&mut self, context: RenderContextId, fog: &FogParams);
    fn set_shadow_technique(
        &mut self,
        context: RenderContextId,
        technique: ShadowTechnique,
        color: Vec3,
        far_distance: f32,
    );

    fn create_viewport(&mut self, camera: VisualId) -> ViewportId;
    fn set_viewport_camera(&mut self, viewport: ViewportId, camera: VisualId);
    fn set_background_color(&mut self, viewport: ViewportId, color: Vec3);
    fn set_viewport_orientation(&mut self, viewport: ViewportId, orientation: ViewportOrientation);
    fn remove_viewport(&mut self, viewport: ViewportId);

    fn create_visual(&mut self, context: RenderContextId, desc: &VisualDesc<'_>) -> VisualId;
    fn destroy_visual(&mut self, visual: VisualId);
    fn attach_visual(&mut self, child: VisualId, parent: VisualId);
    fn set_visual_transform(&mut self, visual: VisualId, transform: &Transform);

    fn create_static_batch(
        &mut self,
        context: RenderContextId,
        material: &str,
        members: &[VisualId],
    ) -> BatchId;
    fn destroy_static_batch(&mut self, batch: BatchId);

    fn draw_lines(&mut self, context: RenderContextId, lines: &[DebugLine]);
}

/// A named placement of a group template in a scene.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPlacement {
    pub name: String,
    pub group: String,
    pub transform: Transform,
}

/// Turns group templates into placed instances and per-material batches.
pub trait GroupInstancer {
    fn define_group(&mut self, name: &str, members: Vec<String>);
    fn place_group(&mut self, scene: SceneId, placement: GroupPlacement);
    /// Spawn member objects for every placement in `scene`. The caller builds
    /// their runtime representations.
    fn build_instances(
        &mut self,
        scene: SceneId,
        directory: &mut ObjectDirectory,
    ) -> Vec<ObjectHandle>;
    /// Forget the spawned members of `scene` and hand them back for teardown.
    fn destroy_instances(&mut self, scene: SceneId) -> Vec<ObjectHandle>;
    fn build_static_batches(
        &mut self,
        scene: SceneId,
        context: RenderContextId,
        directory: &ObjectDirectory,
        renderer: &mut dyn RenderBackend,
    ) -> usize;
    fn destroy_static_batches(&mut self, scene: SceneId, renderer: &mut dyn RenderBackend);
}

/// Scripted logic (logic bricks) and behavior node trees.
pub trait LogicSystem {
    /// Run a named script once. Returns false when no such script exists.
    fn run_script(&mut self, name: &str) -> bool;
    fn update_bricks(&mut self, dt: f32);
    fn update_nodes(&mut self, _dt: f32) {}
    fn unload_scripts(&mut self);
    fn notify_scene_destroyed(&mut self) {}
}

pub trait AudioSystem {
    fn apply_scene_properties(&mut self, props: &SoundProps);
    /// Reclaim finished sound resources.
    fn collect_garbage(&mut self);
    fn update(&mut self, listener: Option<&Transform>);
    fn stop_all(&mut self);
}

pub trait WindowSystem {
    fn size(&self) -> (u32, u32);
    /// Drop per-scene input state.
    fn clear_states(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameStage {
    Physics,
    Constraints,
    LogicBricks,
    LogicNodes,
    Sound,
    Dbvt,
    DebugDraw,
    Clones,
    EndObjects,
}

impl FrameStage {
    pub const ALL: [FrameStage; 9] = [
        FrameStage::Physics,
        FrameStage::Constraints,
        FrameStage::LogicBricks,
        FrameStage::LogicNodes,
        FrameStage::Sound,
        FrameStage::Dbvt,
        FrameStage::DebugDraw,
        FrameStage::Clones,
        FrameStage::EndObjects,
    ];
}

/// Observational per-stage timing.
pub trait FrameStats {
    fn start_clock(&mut self, stage: FrameStage);
    fn stop(&mut self, stage: FrameStage);
}
