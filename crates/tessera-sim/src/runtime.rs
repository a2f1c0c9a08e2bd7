//! Uniform build/destroy of an object's runtime representation.

use tessera_core::components::{ObjectKind, Transform};

use crate::collaborators::{RenderBackend, RenderContextId, VisualDesc, VisualId, VisualKind};

pub trait RuntimeRepresentation {
    fn build_runtime(
        &self,
        renderer: &mut dyn RenderBackend,
        context: RenderContextId,
        name: &str,
        transform: Transform,
    ) -> VisualId;

    fn destroy_runtime(&self, renderer: &mut dyn RenderBackend, visual: VisualId) {
        renderer.destroy_visual(visual);
    }
}

impl RuntimeRepresentation for ObjectKind {
    fn build_runtime(
        &self,
        renderer: &mut dyn RenderBackend,
        context: RenderContextId,
        name: &str,
        transform: Transform,
    ) -> VisualId {
        let kind = match self {
            ObjectKind::Camera(camera) => VisualKind::Camera(camera),
            ObjectKind::Light(light) => VisualKind::Light(light),
            ObjectKind::Entity(entity) => VisualKind::Mesh {
                mesh: entity.mesh_name.as_deref(),
                material: &entity.material,
            },
            ObjectKind::Skeleton(skeleton) => VisualKind::Skeleton {
                bones: &skeleton.bones,
            },
            ObjectKind::Empty => VisualKind::Node,
        };
        renderer.create_visual(
            context,
            &VisualDesc {
                name,
                kind,
                transform,
            },
        )
    }
}
