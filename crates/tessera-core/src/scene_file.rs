use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use glam::Vec3;

use crate::components::{
    CameraData, EntityData, LightData, LightKind, MeshData, ObjectKind, ObjectProperties,
    PhysicsProperties, SkeletonData, Transform,
};
use crate::environment::{EnvironmentProps, FogParams, SkyParams, SoundProps};

#[derive(Debug, thiserror::Error)]
pub enum SceneFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("inheritance cycle detected at object '{0}'")]
    InheritanceCycle(String),
    #[error("object extends missing template '{0}'")]
    MissingTemplate(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SceneFile {
    pub name: String,
    #[serde(default)]
    pub settings: SceneSettings,
    #[serde(default)]
    pub meshes: Vec<MeshDef>,
    #[serde(default)]
    pub objects: Vec<ObjectDef>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDef>,
    #[serde(default)]
    pub groups: Vec<GroupDef>,
    #[serde(default)]
    pub group_instances: Vec<GroupInstanceDef>,
    /// Name of the camera to start with. Falls back to the first camera.
    #[serde(default)]
    pub main_camera: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SceneSettings {
    #[serde(default = "default_world_color")]
    pub world_color: [f32; 3],
    #[serde(default = "default_ambient")]
    pub ambient_color: [f32; 3],
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 3],
    #[serde(default)]
    pub fog: FogParams,
    #[serde(default)]
    pub sky: Option<SkyDef>,
    #[serde(default)]
    pub sound: SoundProps,
    /// Active-layer mask.
    #[serde(default = "default_layers")]
    pub layers: u32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            world_color: default_world_color(),
            ambient_color: default_ambient(),
            gravity: default_gravity(),
            fog: FogParams::default(),
            sky: None,
            sound: SoundProps::default(),
            layers: default_layers(),
        }
    }
}

fn default_world_color() -> [f32; 3] {
    [0.05, 0.05, 0.05]
}

fn default_ambient() -> [f32; 3] {
    [0.2, 0.2, 0.2]
}

fn default_gravity() -> [f32; 3] {
    [0.0, -9.81, 0.0]
}

fn default_layers() -> u32 {
    u32::MAX
}

impl SceneSettings {
    pub fn environment(&self) -> EnvironmentProps {
        EnvironmentProps {
            world_color: Vec3::from_array(self.world_color),
            ambient_color: Vec3::from_array(self.ambient_color),
            gravity: Vec3::from_array(self.gravity),
            fog: self.fog.clone(),
            sky: self.sky.as_ref().map(SkyDef::to_params),
            sound: self.sound.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkyDef {
    pub material: String,
    #[serde(default = "default_sky_distance")]
    pub distance: f32,
    /// Euler angles in degrees.
    #[serde(default)]
    pub rotation: [f32; 3],
}

fn default_sky_distance() -> f32 {
    5000.0
}

impl SkyDef {
    pub fn to_params(&self) -> SkyParams {
        SkyParams {
            material: self.material.clone(),
            distance: self.distance,
            orientation: Transform::from_position_euler(
                Vec3::ZERO,
                Vec3::from_array(self.rotation),
            )
            .rotation,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeshDef {
    pub name: String,
    /// Shorthand for a cube of the given half extent.
    #[serde(default)]
    pub cube: Option<f32>,
    #[serde(flatten)]
    pub data: MeshData,
}

impl MeshDef {
    pub fn to_mesh(&self) -> MeshData {
        match self.cube {
            Some(half_extent) => MeshData::cube(half_extent),
            None => self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Camera,
    Light,
    Entity,
    Skeleton,
    Empty,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ObjectDef {
    pub name: String,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(rename = "type", default)]
    pub object_type: Option<ObjectType>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub layer: Option<u32>,
    #[serde(default)]
    pub transform: Option<TransformDef>,
    #[serde(default)]
    pub camera: Option<CameraDef>,
    #[serde(default)]
    pub light: Option<LightDef>,
    #[serde(default)]
    pub entity: Option<EntityDef>,
    #[serde(default)]
    pub skeleton: Option<SkeletonDef>,
    #[serde(default)]
    pub physics: Option<PhysicsProperties>,
}

impl ObjectDef {
    /// Explicit type, else inferred from whichever payload is present.
    pub fn resolved_type(&self) -> ObjectType {
        if let Some(t) = self.object_type {
            return t;
        }
        if self.camera.is_some() {
            ObjectType::Camera
        } else if self.light.is_some() {
            ObjectType::Light
        } else if self.entity.is_some() {
            ObjectType::Entity
        } else if self.skeleton.is_some() {
            ObjectType::Skeleton
        } else {
            ObjectType::Empty
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self.resolved_type() {
            ObjectType::Camera => {
                ObjectKind::Camera(self.camera.clone().unwrap_or_default().to_data())
            }
            ObjectType::Light => ObjectKind::Light(self.light.clone().unwrap_or_default().to_data()),
            ObjectType::Entity => {
                ObjectKind::Entity(self.entity.clone().unwrap_or_default().to_data())
            }
            ObjectType::Skeleton => ObjectKind::Skeleton(SkeletonData {
                bones: self
                    .skeleton
                    .as_ref()
                    .map(|s| s.bones.clone())
                    .unwrap_or_default(),
            }),
            ObjectType::Empty => ObjectKind::Empty,
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
            .as_ref()
            .map(TransformDef::to_transform)
            .unwrap_or_default()
    }

    pub fn properties(&self) -> ObjectProperties {
        ObjectProperties {
            layer: self.layer.unwrap_or(1),
            active_layer: true,
            parent_name: self.parent.clone(),
            physics: self.physics.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransformDef {
    #[serde(default)]
    pub position: [f32; 3],
    /// Euler angles in degrees.
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl TransformDef {
    pub fn to_transform(&self) -> Transform {
        let mut t = Transform::from_position_euler(
            Vec3::from_array(self.position),
            Vec3::from_array(self.rotation),
        );
        t.scale = Vec3::from_array(self.scale);
        t
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraDef {
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

impl Default for CameraDef {
    fn default() -> Self {
        Self {
            fov: default_fov(),
            near: default_near(),
            far: default_far(),
        }
    }
}

fn default_fov() -> f32 {
    49.0
}
fn default_near() -> f32 {
    0.1
}
fn default_far() -> f32 {
    100.0
}

impl CameraDef {
    fn to_data(&self) -> CameraData {
        CameraData {
            fov_degrees: self.fov,
            near: self.near,
            far: self.far,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LightDef {
    #[serde(default)]
    pub kind: LightKind,
    #[serde(default = "default_white")]
    pub color: [f32; 3],
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default = "default_range")]
    pub range: f32,
    #[serde(default)]
    pub shadows: bool,
}

impl Default for LightDef {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            color: default_white(),
            intensity: default_intensity(),
            range: default_range(),
            shadows: false,
        }
    }
}

fn default_white() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}
fn default_intensity() -> f32 {
    1.0
}
fn default_range() -> f32 {
    25.0
}

impl LightDef {
    fn to_data(&self) -> LightData {
        LightData {
            kind: self.kind,
            color: Vec3::from_array(self.color),
            intensity: self.intensity,
            range: self.range,
            casts_shadows: self.shadows,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EntityDef {
    /// Mesh name in the scene's mesh library.
    #[serde(default)]
    pub mesh: Option<String>,
    #[serde(default)]
    pub material: String,
}

impl EntityDef {
    fn to_data(&self) -> EntityData {
        EntityData {
            mesh_name: self.mesh.clone(),
            mesh: None,
            material: self.material.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SkeletonDef {
    #[serde(default)]
    pub bones: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintDef {
    LimitLocation {
        object: String,
        min: [f32; 3],
        max: [f32; 3],
        #[serde(default = "default_influence")]
        influence: f32,
    },
    CopyLocation {
        object: String,
        target: String,
        #[serde(default)]
        offset: [f32; 3],
        #[serde(default = "default_influence")]
        influence: f32,
    },
}

fn default_influence() -> f32 {
    1.0
}

impl ConstraintDef {
    pub fn object(&self) -> &str {
        match self {
            ConstraintDef::LimitLocation { object, .. } => object,
            ConstraintDef::CopyLocation { object, .. } => object,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupDef {
    pub name: String,
    /// Template object names.
    #[serde(default)]
    pub objects: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupInstanceDef {
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub transform: Option<TransformDef>,
}

impl GroupInstanceDef {
    pub fn transform(&self) -> Transform {
        self.transform
            .as_ref()
            .map(TransformDef::to_transform)
            .unwrap_or_default()
    }
}

/// Load and parse a scene YAML file, resolving object templates.
pub fn load_scene(path: &Path) -> Result<SceneFile, SceneFileError> {
    let contents = std::fs::read_to_string(path)?;
    parse_scene(&contents)
}

pub fn parse_scene(contents: &str) -> Result<SceneFile, SceneFileError> {
    let mut scene: SceneFile = serde_yaml::from_str(contents)?;
    scene.objects = resolve_inheritance(&scene.objects)?;
    tracing::info!(
        "Parsed scene '{}': {} objects, {} groups",
        scene.name,
        scene.objects.len(),
        scene.groups.len()
    );
    Ok(scene)
}

/// Resolve `extends` chains: template fields fill in whatever the object
/// leaves unset.
fn resolve_inheritance(objects: &[ObjectDef]) -> Result<Vec<ObjectDef>, SceneFileError> {
    let by_name: HashMap<&str, &ObjectDef> =
        objects.iter().map(|o| (o.name.as_str(), o)).collect();

    objects
        .iter()
        .map(|object| {
            let mut merged = object.clone();
            let mut seen = HashSet::from([object.name.as_str()]);
            let mut next = object.extends.as_deref();
            while let Some(template_name) = next {
                if !seen.insert(template_name) {
                    return Err(SceneFileError::InheritanceCycle(object.name.clone()));
                }
                let template = by_name
                    .get(template_name)
                    .ok_or_else(|| SceneFileError::MissingTemplate(template_name.to_string()))?;
                merge_object(&mut merged, template);
                next = template.extends.as_deref();
            }
            merged.extends = None;
            Ok(merged)
        })
        .collect()
}

fn merge_object(child: &mut ObjectDef, template: &ObjectDef) {
    fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
        if slot.is_none() {
            slot.clone_from(from);
        }
    }
    fill(&mut child.object_type, &template.object_type);
    fill(&mut child.parent, &template.parent);
    fill(&mut child.layer, &template.layer);
    fill(&mut child.transform, &template.transform);
    fill(&mut child.camera, &template.camera);
    fill(&mut child.light, &template.light);
    fill(&mut child.entity, &template.entity);
    fill(&mut child.skeleton, &template.skeleton);
    fill(&mut child.physics, &template.physics);
}
