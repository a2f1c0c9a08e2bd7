//! Global object table. Every scene object lives here as a `hecs` entity;
//! scenes index them by name and refer to them by `ObjectHandle`.

use tessera_core::components::{
    CloneOf, GroupMember, Hierarchy, LifeSpan, ObjectHandle, ObjectKind, ObjectName,
    ObjectProperties, Owner, SceneId, Transform,
};

use crate::collaborators::VisualId;
use crate::physics::PhysicsController;

/// Present while the object has a live runtime representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    pub visual: VisualId,
}

/// The transform the object was authored with. Runtime writes (physics,
/// constraints, parenting) go to `Transform`; this copy survives them so a
/// reinstanced object starts from where it was placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Authored(pub Transform);

#[derive(Default)]
pub struct ObjectDirectory {
    world: hecs::World,
}

impl ObjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object factory. The new object is free (no owner).
    pub fn create(
        &mut self,
        name: &str,
        kind: ObjectKind,
        transform: Transform,
        properties: ObjectProperties,
    ) -> ObjectHandle {
        ObjectHandle(self.world.spawn((
            ObjectName(name.to_string()),
            kind,
            transform,
            Authored(transform),
            properties,
            Owner(None),
            Hierarchy::default(),
        )))
    }

    /// Duplicate the authored state of `source` under a new name. Runtime
    /// state (instance, controller, links, owner) is not copied.
    pub fn duplicate(&mut self, source: ObjectHandle, name: &str) -> Option<ObjectHandle> {
        let (source_name, kind, transform, properties) = {
            let entity = self.world.entity(source.0).ok()?;
            let source_name = entity.get::<&ObjectName>()?.0.clone();
            let kind = (*entity.get::<&ObjectKind>()?).clone();
            let transform = entity.get::<&Authored>()?.0;
            let properties = (*entity.get::<&ObjectProperties>()?).clone();
            (source_name, kind, transform, properties)
        };
        let handle = self.create(name, kind, transform, properties);
        let _ = self.world.insert_one(handle.0, CloneOf(source_name));
        Some(handle)
    }

    /// Deallocate an object, unlinking it from its parent and children.
    pub fn destroy(&mut self, handle: ObjectHandle) -> bool {
        let hierarchy = match self.world.remove_one::<Hierarchy>(handle.0) {
            Ok(h) => h,
            Err(_) => return false,
        };
        if let Some(parent) = hierarchy.parent {
            if let Ok(mut links) = self.world.get::<&mut Hierarchy>(parent.0) {
                links.children.retain(|c| *c != handle);
            }
        }
        for child in hierarchy.children {
            if let Ok(mut links) = self.world.get::<&mut Hierarchy>(child.0) {
                links.parent = None;
            }
        }
        self.world.despawn(handle.0).is_ok()
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.world.contains(handle.0)
    }

    pub fn len(&self) -> usize {
        self.world.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty()
    }

    pub fn name(&self, handle: ObjectHandle) -> Option<String> {
        self.world
            .get::<&ObjectName>(handle.0)
            .ok()
            .map(|n| n.0.clone())
    }

    pub fn kind(&self, handle: ObjectHandle) -> Option<hecs::Ref<'_, ObjectKind>> {
        self.world.get::<&ObjectKind>(handle.0).ok()
    }

    pub fn kind_mut(&self, handle: ObjectHandle) -> Option<hecs::RefMut<'_, ObjectKind>> {
        self.world.get::<&mut ObjectKind>(handle.0).ok()
    }

    pub fn is_camera(&self, handle: ObjectHandle) -> bool {
        self.kind(handle).map_or(false, |k| k.is_camera())
    }

    pub fn is_light(&self, handle: ObjectHandle) -> bool {
        self.kind(handle).map_or(false, |k| k.is_light())
    }

    pub fn transform(&self, handle: ObjectHandle) -> Option<Transform> {
        self.world.get::<&Transform>(handle.0).ok().map(|t| *t)
    }

    pub fn set_transform(&mut self, handle: ObjectHandle, transform: Transform) -> bool {
        match self.world.get::<&mut Transform>(handle.0) {
            Ok(mut t) => {
                *t = transform;
                true
            }
            Err(_) => false,
        }
    }

    pub fn authored(&self, handle: ObjectHandle) -> Option<Transform> {
        self.world.get::<&Authored>(handle.0).ok().map(|a| a.0)
    }

    /// Re-author an object. The live transform follows.
    pub fn set_authored(&mut self, handle: ObjectHandle, transform: Transform) -> bool {
        match self.world.get::<&mut Authored>(handle.0) {
            Ok(mut a) => a.0 = transform,
            Err(_) => return false,
        }
        self.set_transform(handle, transform)
    }

    /// Drop runtime movement and put the object back where it was authored.
    pub fn restore_authored(&mut self, handle: ObjectHandle) -> bool {
        match self.authored(handle) {
            Some(transform) => self.set_transform(handle, transform),
            None => false,
        }
    }

    /// World transform, composed up the parent chain.
    pub fn world_transform(&self, handle: ObjectHandle) -> Option<Transform> {
        let mut world = self.transform(handle)?;
        let mut next = self.parent(handle);
        while let Some(parent) = next {
            world = world.compose(&self.transform(parent)?);
            next = self.parent(parent);
        }
        Some(world)
    }

    pub fn properties(&self, handle: ObjectHandle) -> Option<hecs::Ref<'_, ObjectProperties>> {
        self.world.get::<&ObjectProperties>(handle.0).ok()
    }

    pub fn properties_mut(
        &self,
        handle: ObjectHandle,
    ) -> Option<hecs::RefMut<'_, ObjectProperties>> {
        self.world.get::<&mut ObjectProperties>(handle.0).ok()
    }

    pub fn owner(&self, handle: ObjectHandle) -> Option<SceneId> {
        self.world.get::<&Owner>(handle.0).ok().and_then(|o| o.0)
    }

    pub fn set_owner(&mut self, handle: ObjectHandle, owner: Option<SceneId>) {
        if let Ok(mut o) = self.world.get::<&mut Owner>(handle.0) {
            o.0 = owner;
        }
    }

    /// Look an object up by name, accepting it only if `scene` owns it.
    pub fn find_owned(&self, name: &str, scene: SceneId) -> Option<ObjectHandle> {
        self.world
            .query::<(&ObjectName, &Owner)>()
            .iter()
            .find(|(_, (n, o))| n.0 == name && o.0 == Some(scene))
            .map(|(e, _)| ObjectHandle(e))
    }

    /// Instanced objects owned by `scene`.
    pub fn instanced_owned_by(&self, scene: SceneId) -> Vec<ObjectHandle> {
        self.world
            .query::<(&Owner, &Instance)>()
            .iter()
            .filter(|(_, (o, _))| o.0 == Some(scene))
            .map(|(e, _)| ObjectHandle(e))
            .collect()
    }

    pub fn is_instanced(&self, handle: ObjectHandle) -> bool {
        self.world.get::<&Instance>(handle.0).is_ok()
    }

    pub fn visual(&self, handle: ObjectHandle) -> Option<VisualId> {
        self.world.get::<&Instance>(handle.0).ok().map(|i| i.visual)
    }

    pub fn set_instance(&mut self, handle: ObjectHandle, visual: VisualId) {
        let _ = self.world.insert_one(handle.0, Instance { visual });
    }

    pub fn take_instance(&mut self, handle: ObjectHandle) -> Option<VisualId> {
        self.world
            .remove_one::<Instance>(handle.0)
            .ok()
            .map(|i| i.visual)
    }

    pub fn parent(&self, handle: ObjectHandle) -> Option<ObjectHandle> {
        self.world
            .get::<&Hierarchy>(handle.0)
            .ok()
            .and_then(|h| h.parent)
    }

    pub fn children(&self, handle: ObjectHandle) -> Vec<ObjectHandle> {
        self.world
            .get::<&Hierarchy>(handle.0)
            .map(|h| h.children.clone())
            .unwrap_or_default()
    }

    pub fn attach_child(&mut self, parent: ObjectHandle, child: ObjectHandle) {
        if parent == child {
            return;
        }
        if let Some(old) = self.parent(child) {
            if let Ok(mut links) = self.world.get::<&mut Hierarchy>(old.0) {
                links.children.retain(|c| *c != child);
            }
        }
        if let Ok(mut links) = self.world.get::<&mut Hierarchy>(child.0) {
            links.parent = Some(parent);
        }
        if let Ok(mut links) = self.world.get::<&mut Hierarchy>(parent.0) {
            if !links.children.contains(&child) {
                links.children.push(child);
            }
        }
    }

    /// Cut the link between `child` and its parent. The child's transform is
    /// left as is.
    pub fn detach(&mut self, child: ObjectHandle) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Ok(mut links) = self.world.get::<&mut Hierarchy>(parent.0) {
            links.children.retain(|c| *c != child);
        }
        if let Ok(mut links) = self.world.get::<&mut Hierarchy>(child.0) {
            links.parent = None;
        }
    }

    pub fn controller(&self, handle: ObjectHandle) -> Option<PhysicsController> {
        self.world
            .get::<&PhysicsController>(handle.0)
            .ok()
            .map(|c| *c)
    }

    pub fn set_controller(&mut self, handle: ObjectHandle, controller: PhysicsController) {
        let _ = self.world.insert_one(handle.0, controller);
    }

    pub fn take_controller(&mut self, handle: ObjectHandle) -> Option<PhysicsController> {
        self.world.remove_one::<PhysicsController>(handle.0).ok()
    }

    pub fn life_span(&self, handle: ObjectHandle) -> Option<LifeSpan> {
        self.world.get::<&LifeSpan>(handle.0).ok().map(|l| *l)
    }

    pub fn set_life_span(&mut self, handle: ObjectHandle, life_span: LifeSpan) {
        let _ = self.world.insert_one(handle.0, life_span);
    }

    /// Advance a clone's life span by one frame. Returns true once expired.
    pub fn advance_life_span(&mut self, handle: ObjectHandle) -> bool {
        self.world
            .get::<&mut LifeSpan>(handle.0)
            .map_or(false, |mut l| l.advance())
    }

    pub fn is_clone(&self, handle: ObjectHandle) -> bool {
        self.world.get::<&CloneOf>(handle.0).is_ok()
    }

    pub fn is_group_member(&self, handle: ObjectHandle) -> bool {
        self.world.get::<&GroupMember>(handle.0).is_ok()
    }

    pub fn mark_group_member(&mut self, handle: ObjectHandle, member: GroupMember) {
        let _ = self.world.insert_one(handle.0, member);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use tessera_core::components::EntityData;

    fn cube(directory: &mut ObjectDirectory, name: &str) -> ObjectHandle {
        directory.create(
            name,
            ObjectKind::Entity(EntityData::default()),
            Transform::from_position(Vec3::new(1.0, 2.0, 3.0)),
            ObjectProperties::default(),
        )
    }

    #[test]
    fn created_objects_are_free() {
        let mut directory = ObjectDirectory::new();
        let h = cube(&mut directory, "Cube");
        assert_eq!(directory.name(h).as_deref(), Some("Cube"));
        assert_eq!(directory.owner(h), None);
        assert!(!directory.is_instanced(h));
        assert!(!directory.is_clone(h));
    }

    #[test]
    fn find_owned_requires_matching_owner() {
        let mut directory = ObjectDirectory::new();
        let h = cube(&mut directory, "Cube");
        assert_eq!(directory.find_owned("Cube", SceneId(1)), None);
        directory.set_owner(h, Some(SceneId(1)));
        assert_eq!(directory.find_owned("Cube", SceneId(1)), Some(h));
        assert_eq!(directory.find_owned("Cube", SceneId(2)), None);
    }

    #[test]
    fn duplicate_copies_authored_state_only() {
        let mut directory = ObjectDirectory::new();
        let h = cube(&mut directory, "Cube");
        directory.set_owner(h, Some(SceneId(1)));
        directory.set_instance(h, VisualId(7));

        let copy = directory.duplicate(h, "Cube.001").unwrap();
        assert!(directory.is_clone(copy));
        assert_eq!(directory.transform(copy), directory.transform(h));
        assert!(matches!(
            directory.kind(copy).as_deref(),
            Some(ObjectKind::Entity(_))
        ));
        assert_eq!(directory.owner(copy), None);
        assert!(!directory.is_instanced(copy));
    }

    #[test]
    fn destroy_unlinks_hierarchy() {
        let mut directory = ObjectDirectory::new();
        let parent = cube(&mut directory, "Parent");
        let child = cube(&mut directory, "Child");
        directory.attach_child(parent, child);
        assert_eq!(directory.parent(child), Some(parent));
        assert_eq!(directory.children(parent), vec![child]);

        assert!(directory.destroy(parent));
        assert!(!directory.contains(parent));
        assert_eq!(directory.parent(child), None);
        assert!(!directory.destroy(parent));
    }

    #[test]
    fn duplicate_starts_from_the_authored_transform() {
        let mut directory = ObjectDirectory::new();
        let h = cube(&mut directory, "Cube");
        directory.set_transform(h, Transform::from_position(Vec3::ZERO));
        let copy = directory.duplicate(h, "Cube.001").unwrap();
        assert_eq!(
            directory.transform(copy).unwrap().position,
            Vec3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn runtime_moves_leave_the_authored_transform() {
        let mut directory = ObjectDirectory::new();
        let h = cube(&mut directory, "Cube");
        directory.set_transform(h, Transform::from_position(Vec3::ZERO));
        assert_eq!(directory.authored(h).unwrap().position, Vec3::new(1.0, 2.0, 3.0));

        assert!(directory.restore_authored(h));
        assert_eq!(directory.transform(h).unwrap().position, Vec3::new(1.0, 2.0, 3.0));

        let moved = Transform::from_position(Vec3::X);
        assert!(directory.set_authored(h, moved));
        assert_eq!(directory.transform(h), Some(moved));
        assert_eq!(directory.authored(h), Some(moved));
    }

    #[test]
    fn detach_cuts_both_sides_of_the_link() {
        let mut directory = ObjectDirectory::new();
        let parent = cube(&mut directory, "Parent");
        let child = cube(&mut directory, "Child");
        directory.attach_child(parent, child);
        directory.detach(child);
        assert_eq!(directory.parent(child), None);
        assert!(directory.children(parent).is_empty());
        directory.detach(child);
    }

    #[test]
    fn world_transform_composes_parents() {
        let mut directory = ObjectDirectory::new();
        let parent = cube(&mut directory, "Parent");
        let child = directory.create(
            "Child",
            ObjectKind::Empty,
            Transform::from_position(Vec3::new(0.0, 0.0, 1.0)),
            ObjectProperties::default(),
        );
        directory.attach_child(parent, child);
        let world = directory.world_transform(child).unwrap();
        assert!((world.position - Vec3::new(1.0, 2.0, 4.0)).length() < 1e-5);
    }
}
