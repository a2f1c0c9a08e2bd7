use std::collections::{BTreeMap, HashMap};

use tessera_core::components::{GroupMember, ObjectHandle, ObjectKind, PhysicsKind, SceneId};

use crate::collaborators::{
    BatchId, GroupInstancer, GroupPlacement, RenderBackend, RenderContextId, VisualId,
};
use crate::directory::ObjectDirectory;

/// Group templates and their placements, per scene.
///
/// Placing a group clones every template member into the scene as a group
/// member named `"{placement}/{member}"`. Members keep their relative layout
/// and parent links inside the placement.
#[derive(Debug, Default)]
pub struct GroupManager {
    groups: HashMap<String, Vec<String>>,
    placements: HashMap<SceneId, Vec<GroupPlacement>>,
    spawned: HashMap<SceneId, Vec<ObjectHandle>>,
    batches: HashMap<SceneId, Vec<BatchId>>,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn spawned_count(&self, scene: SceneId) -> usize {
        self.spawned.get(&scene).map_or(0, Vec::len)
    }

    pub fn batch_count(&self, scene: SceneId) -> usize {
        self.batches.get(&scene).map_or(0, Vec::len)
    }
}

impl GroupInstancer for GroupManager {
    fn define_group(&mut self, name: &str, members: Vec<String>) {
        if self.groups.insert(name.to_string(), members).is_some() {
            tracing::warn!("Group '{}' redefined", name);
        }
    }

    fn place_group(&mut self, scene: SceneId, placement: GroupPlacement) {
        self.placements.entry(scene).or_default().push(placement);
    }

    fn build_instances(
        &mut self,
        scene: SceneId,
        directory: &mut ObjectDirectory,
    ) -> Vec<ObjectHandle> {
        let mut created = Vec::new();
        let Some(placements) = self.placements.get(&scene) else {
            return created;
        };

        for placement in placements {
            let Some(members) = self.groups.get(&placement.group) else {
                tracing::warn!(
                    "Placement '{}' refers to unknown group '{}'",
                    placement.name,
                    placement.group
                );
                continue;
            };

            for member in members {
                let Some(template) = directory.find_owned(member, scene) else {
                    tracing::warn!("Group '{}' member '{}' not found", placement.group, member);
                    continue;
                };
                let name = format!("{}/{}", placement.name, member);
                let Some(handle) = directory.duplicate(template, &name) else {
                    continue;
                };
                if let Some(local) = directory.authored(template) {
                    directory.set_authored(handle, local.compose(&placement.transform));
                }
                if let Some(mut props) = directory.properties_mut(handle) {
                    props.active_layer = true;
                    if let Some(parent) = props.parent_name.take() {
                        if members.contains(&parent) {
                            props.parent_name = Some(format!("{}/{}", placement.name, parent));
                        }
                    }
                }
                directory.set_owner(handle, Some(scene));
                directory.mark_group_member(
                    handle,
                    GroupMember {
                        group: placement.group.clone(),
                        placement: placement.name.clone(),
                    },
                );
                created.push(handle);
            }
        }

        tracing::info!("Built {} group members for {}", created.len(), scene);
        self.spawned
            .entry(scene)
            .or_default()
            .extend(created.iter().copied());
        created
    }

    fn destroy_instances(&mut self, scene: SceneId) -> Vec<ObjectHandle> {
        self.spawned.remove(&scene).unwrap_or_default()
    }

    fn build_static_batches(
        &mut self,
        scene: SceneId,
        context: RenderContextId,
        directory: &ObjectDirectory,
        renderer: &mut dyn RenderBackend,
    ) -> usize {
        let mut by_material: BTreeMap<String, Vec<VisualId>> = BTreeMap::new();
        for handle in directory.instanced_owned_by(scene) {
            let Some(kind) = directory.kind(handle) else {
                continue;
            };
            let ObjectKind::Entity(entity) = &*kind else {
                continue;
            };
            let movable = directory
                .properties(handle)
                .map_or(true, |p| p.physics.kind != PhysicsKind::NoCollision);
            if movable || directory.parent(handle).is_some() {
                continue;
            }
            if let Some(visual) = directory.visual(handle) {
                by_material
                    .entry(entity.material.clone())
                    .or_default()
                    .push(visual);
            }
        }

        let batches = self.batches.entry(scene).or_default();
        for (material, members) in &by_material {
            batches.push(renderer.create_static_batch(context, material, members));
        }
        by_material.len()
    }

    fn destroy_static_batches(&mut self, scene: SceneId, renderer: &mut dyn RenderBackend) {
        for batch in self.batches.remove(&scene).unwrap_or_default() {
            renderer.destroy_static_batch(batch);
        }
    }
}
