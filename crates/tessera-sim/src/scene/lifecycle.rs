use std::collections::HashMap;

use glam::Vec3;

use tessera_core::components::{
    Aabb, CameraData, ObjectHandle, ObjectKind, ObjectProperties, Transform,
};
use tessera_core::environment::FogMode;
use tessera_core::events::LifecycleKind;

use super::{InstanceState, Scene, DEFAULT_CAMERA_NAME};
use crate::context::Services;
use crate::debug::PhysicsDebugger;
use crate::error::SceneError;
use crate::navmesh::{NavMeshConfig, NavMeshTicket, NavMeshWorker, NavigationData};
use crate::runtime::RuntimeRepresentation;

impl Scene {
    /// Bring the scene to life.
    ///
    /// Configuration is validated before anything is created, so a bad
    /// config leaves the renderer untouched. A scene with no objects ends up
    /// in `InstanceState::Error`.
    pub fn instantiate(&mut self, svc: &mut Services) -> Result<InstanceState, SceneError> {
        if matches!(self.state, InstanceState::Instanced | InstanceState::Creating) {
            return Ok(self.state);
        }
        let shadows = svc.config.shadow_settings()?;

        if self.objects.is_empty() {
            tracing::error!("Scene '{}' has no objects to instance", self.name);
            self.state = InstanceState::Error;
            svc.events.emit(LifecycleKind::SceneFailed, &self.name, None);
            return Ok(self.state);
        }

        tracing::info!("Instancing scene '{}'", self.name);
        self.state = InstanceState::Creating;

        let context = svc.renderer.create_context(&self.name);
        self.render_context = Some(context);
        if let Some(sky) = &self.base.sky {
            svc.renderer.set_skybox(context, sky);
        }

        self.dynamics_world(svc);

        let registered: Vec<ObjectHandle> = self.objects.values().copied().collect();
        for object in registered {
            if svc.directory.is_instanced(object) {
                continue;
            }
            let on_layer = svc
                .directory
                .properties(object)
                .map_or(false, |p| p.layer & self.layers != 0);
            if on_layer {
                self.create_object_instance(svc, object);
            }
        }

        for member in svc.groups.build_instances(self.id, &mut svc.directory) {
            self.create_object_instance(svc, member);
        }
        if svc.config.build_static_geometry {
            let batches = svc.groups.build_static_batches(
                self.id,
                context,
                &svc.directory,
                svc.renderer.as_mut(),
            );
            tracing::debug!("Built {} static batches for '{}'", batches, self.name);
        }

        self.apply_builtin_parents(svc);
        self.apply_builtin_physics(svc);

        let camera = self.resolve_camera(svc);
        self.set_main_camera(svc, camera);
        let Some(viewport) = self.viewport else {
            panic!("scene '{}' has no viewport after camera resolution", self.name);
        };

        svc.renderer
            .set_background_color(viewport, self.base.world_color);
        svc.renderer
            .set_ambient_light(context, self.base.ambient_color);
        svc.renderer
            .set_viewport_orientation(viewport, svc.config.viewport_orientation());
        if self.base.fog.mode != FogMode::None {
            svc.renderer.set_fog(context, &self.base.fog);
        }
        if let Some(shadows) = shadows {
            svc.renderer.set_shadow_technique(
                context,
                shadows.technique,
                shadows.color,
                shadows.far_distance,
            );
        }
        svc.audio.apply_scene_properties(&self.base.sound);

        if svc.config.debug_physics {
            self.debugger = Some(PhysicsDebugger::new());
        }

        svc.active_scene = Some(self.id);
        self.state = InstanceState::Instanced;
        svc.events
            .emit(LifecycleKind::SceneInstanced, &self.name, None);

        let init_script = svc.config.init_script.clone();
        if !svc.logic.run_script(&init_script) {
            tracing::debug!("No init script '{}' for '{}'", init_script, self.name);
        }

        Ok(self.state)
    }

    /// Tear the live scene down in reverse dependency order. Does nothing
    /// unless the scene is instanced.
    pub fn destroy_instance(&mut self, svc: &mut Services) {
        if self.state != InstanceState::Instanced {
            return;
        }
        tracing::info!("Destroying scene instance '{}'", self.name);
        self.state = InstanceState::Destroying;

        if let Some(navigation) = &mut self.navigation {
            navigation.destroy_instances();
        }
        svc.logic.unload_scripts();

        self.cameras.clear();
        self.lights.clear();
        self.static_controllers.clear();

        for member in svc.groups.destroy_instances(self.id) {
            self.destroy_object_instance(svc, member);
            self.release(svc, member);
        }
        if svc.config.build_static_geometry {
            svc.groups
                .destroy_static_batches(self.id, svc.renderer.as_mut());
        }

        for object in svc.directory.instanced_owned_by(self.id) {
            self.destroy_object_instance(svc, object);
        }

        self.destroy_clones(svc);
        self.end_objects(svc);

        self.physics_world = None;
        self.debugger = None;
        self.start_camera = None;
        self.limits = Aabb::NULL;
        self.mark_dbvt = false;

        if let Some(context) = self.render_context.take() {
            svc.renderer.destroy_context(context);
        }
        if let Some(viewport) = self.viewport.take() {
            svc.renderer.remove_viewport(viewport);
        }

        svc.logic.notify_scene_destroyed();
        svc.window.clear_states();
        if svc.active_scene == Some(self.id) {
            svc.active_scene = None;
        }
        svc.audio.stop_all();

        self.state = InstanceState::Uninstanced;
        svc.events
            .emit(LifecycleKind::SceneDestroyed, &self.name, None);
    }

    /// Build the runtime representation of one object and let every
    /// dependent subsystem know about it.
    pub fn create_object_instance(&mut self, svc: &mut Services, object: ObjectHandle) -> bool {
        if svc.directory.is_instanced(object) {
            return false;
        }
        let Some(context) = self.render_context else {
            return false;
        };
        if svc.directory.parent(object).is_none() {
            svc.directory.restore_authored(object);
        }
        let (Some(name), Some(transform)) =
            (svc.directory.name(object), svc.directory.world_transform(object))
        else {
            return false;
        };
        let Some(kind) = svc.directory.kind(object).map(|k| (*k).clone()) else {
            return false;
        };

        let visual = kind.build_runtime(svc.renderer.as_mut(), context, &name, transform);
        svc.directory.set_instance(object, visual);

        if kind.is_camera() && !self.cameras.contains(&object) {
            self.cameras.push(object);
        }
        if kind.is_light() && !self.lights.contains(&object) {
            self.lights.push(object);
            self.has_lights = true;
        }
        if let Some(constraints) = &mut self.constraints {
            constraints.notify_instance_created(object);
        }
        if let Some(navigation) = &mut self.navigation {
            navigation.update_or_create(object, &svc.directory, &self.meshes);
        }
        // Physics is built in one pass after the hierarchy while creating
        if self.state != InstanceState::Creating {
            self.create_physics_object(svc, object);
        }

        svc.events
            .emit(LifecycleKind::ObjectInstanced, &self.name, Some(name.as_str()));
        true
    }

    /// Inverse of `create_object_instance`. The object stays registered.
    pub fn destroy_object_instance(&mut self, svc: &mut Services, object: ObjectHandle) -> bool {
        if !svc.directory.is_instanced(object) {
            return false;
        }
        self.destroy_physics_object(svc, object);

        if self.state != InstanceState::Destroying {
            self.cameras.retain(|c| *c != object);
            self.lights.retain(|l| *l != object);
        }
        if let Some(constraints) = &mut self.constraints {
            constraints.notify_instance_destroyed(object);
        }
        if let Some(navigation) = &mut self.navigation {
            navigation.destroy_instance(object);
        }

        // Links are rebuilt from parent names on the next instantiate
        for child in svc.directory.children(object) {
            if let Some(world) = svc.directory.world_transform(child) {
                svc.directory.set_transform(child, world);
            }
            svc.directory.detach(child);
        }
        svc.directory.detach(object);

        if let Some(visual) = svc.directory.take_instance(object) {
            if let Some(kind) = svc.directory.kind(object) {
                kind.destroy_runtime(svc.renderer.as_mut(), visual);
            }
        }
        let name = svc.directory.name(object);
        svc.events
            .emit(LifecycleKind::ObjectDestroyed, &self.name, name.as_deref());
        true
    }

    /// Resolve saved parent names into hierarchy links. Transforms were
    /// authored in world space, so each child is re-expressed relative to
    /// its parent using the world matrices captured before any linking.
    fn apply_builtin_parents(&mut self, svc: &mut Services) {
        let instanced = svc.directory.instanced_owned_by(self.id);
        let authored: HashMap<ObjectHandle, Transform> = instanced
            .iter()
            .filter_map(|h| Some((*h, svc.directory.authored(*h)?)))
            .collect();

        let mut links = Vec::new();
        for child in &instanced {
            let parent_name = svc
                .directory
                .properties(*child)
                .and_then(|p| p.parent_name.clone());
            let Some(parent_name) = parent_name else {
                continue;
            };
            match self.find_instanced_object(svc, &parent_name) {
                Some(parent) if parent != *child => links.push((*child, parent)),
                _ => tracing::warn!(
                    "Scene '{}': parent '{}' of '{}' is not instanced",
                    self.name,
                    parent_name,
                    svc.directory.name(*child).unwrap_or_default()
                ),
            }
        }

        for (child, parent) in links {
            let (Some(child_world), Some(parent_world)) =
                (authored.get(&child), authored.get(&parent))
            else {
                continue;
            };
            svc.directory.attach_child(parent, child);
            let relative = child_world.relative_to(parent_world);
            svc.directory.set_transform(child, relative);

            if let (Some(child_visual), Some(parent_visual)) =
                (svc.directory.visual(child), svc.directory.visual(parent))
            {
                svc.renderer.attach_visual(child_visual, parent_visual);
                svc.renderer.set_visual_transform(child_visual, &relative);
            }
        }
    }

    fn apply_builtin_physics(&mut self, svc: &mut Services) {
        for object in svc.directory.instanced_owned_by(self.id) {
            if svc.directory.parent(object).is_none() {
                self.create_physics_object(svc, object);
            }
        }
    }

    /// Explicit main camera, else the first camera, else a synthesized one.
    pub(super) fn resolve_camera(&mut self, svc: &mut Services) -> ObjectHandle {
        let id = self.id;
        if let Some(camera) = self
            .start_camera
            .filter(|c| svc.directory.owner(*c) == Some(id) && svc.directory.is_instanced(*c))
        {
            return camera;
        }
        if let Some(camera) = self.cameras.first() {
            return *camera;
        }

        tracing::info!("Scene '{}' has no camera, adding a default one", self.name);
        let existing = self.get_object(svc, DEFAULT_CAMERA_NAME);
        let camera = existing.unwrap_or_else(|| {
            let camera = svc.directory.create(
                DEFAULT_CAMERA_NAME,
                ObjectKind::Camera(CameraData::default()),
                Transform::from_position_euler(Vec3::new(0.0, -5.0, 0.0), Vec3::new(90.0, 0.0, 0.0)),
                ObjectProperties::default(),
            );
            self.add_object(svc, camera);
            camera
        });
        self.create_object_instance(svc, camera);
        camera
    }

    /// Look through `camera`. The viewport is created or retargeted once the
    /// camera is instanced; before that the choice is remembered.
    pub fn set_main_camera(&mut self, svc: &mut Services, camera: ObjectHandle) -> bool {
        if !svc.directory.is_camera(camera) {
            tracing::warn!("Scene '{}': main camera must be a camera", self.name);
            return false;
        }
        if svc.directory.owner(camera) != Some(self.id) {
            tracing::warn!(
                "Scene '{}': camera '{}' belongs to another scene",
                self.name,
                svc.directory.name(camera).unwrap_or_default()
            );
            return false;
        }
        self.start_camera = Some(camera);

        let Some(visual) = svc.directory.visual(camera) else {
            return true;
        };
        let (width, height) = svc.window.size();
        if height > 0 {
            if let Some(mut kind) = svc.directory.kind_mut(camera) {
                if let ObjectKind::Camera(data) = &mut *kind {
                    data.aspect_ratio = width as f32 / height as f32;
                }
            }
        }
        match self.viewport {
            Some(viewport) => svc.renderer.set_viewport_camera(viewport, visual),
            None => self.viewport = Some(svc.renderer.create_viewport(visual)),
        }
        true
    }

    /// Physics debug drawing, created on first request while instanced.
    pub fn debugger(&mut self) -> Option<&mut PhysicsDebugger> {
        if self.debugger.is_none() && self.is_instanced() {
            self.debugger = Some(PhysicsDebugger::new());
        }
        self.debugger.as_mut()
    }

    /// Start collecting navigation geometry. Objects already live are added.
    pub fn enable_navigation(&mut self, svc: &Services) {
        if self.navigation.is_some() {
            return;
        }
        let mut data = NavigationData::new();
        for object in svc.directory.instanced_owned_by(self.id) {
            data.update_or_create(object, &svc.directory, &self.meshes);
        }
        self.navigation = Some(data);
    }

    /// Hand a snapshot of the navigation geometry to the worker if it changed
    /// since the last submission.
    pub fn async_try_create_navigation_mesh(
        &mut self,
        worker: &mut NavMeshWorker,
        config: &NavMeshConfig,
    ) -> Option<NavMeshTicket> {
        let navigation = self.navigation.as_mut()?;
        if !navigation.has_changed() {
            return None;
        }
        let ticket = worker.submit(navigation.clone_data(), config.clone());
        navigation.reset_has_changed();
        tracing::debug!("Scene '{}' submitted navigation mesh {:?}", self.name, ticket);
        Some(ticket)
    }
}
