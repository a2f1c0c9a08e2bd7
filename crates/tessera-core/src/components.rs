use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Handle of an object in the object directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub hecs::Entity);

/// Identifies a scene owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(pub u32);

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}

/// Transform component. Present on every object.
///
/// Authored transforms are in world space. Once an object is attached to a
/// parent the transform is re-expressed relative to that parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Build a transform from a position and XYZ euler angles in degrees.
    pub fn from_position_euler(position: Vec3, euler_degrees: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::from_euler(
                EulerRot::XYZ,
                euler_degrees.x.to_radians(),
                euler_degrees.y.to_radians(),
                euler_degrees.z.to_radians(),
            ),
            scale: Vec3::ONE,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Express `self` (a world transform) relative to `parent` (also world).
    pub fn relative_to(&self, parent: &Transform) -> Transform {
        Transform::from_matrix(parent.to_matrix().inverse() * self.to_matrix())
    }

    /// Compose a local transform onto a parent world transform.
    pub fn compose(&self, parent: &Transform) -> Transform {
        Transform::from_matrix(parent.to_matrix() * self.to_matrix())
    }
}

/// Unique (per scene) name of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName(pub String);

/// Type tag of an object, restricted to the kinds the scene graph knows.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Camera(CameraData),
    Light(LightData),
    Entity(EntityData),
    Skeleton(SkeletonData),
    Empty,
}

impl ObjectKind {
    pub fn is_camera(&self) -> bool {
        matches!(self, ObjectKind::Camera(_))
    }

    pub fn is_light(&self) -> bool {
        matches!(self, ObjectKind::Light(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectKind::Camera(_) => "camera",
            ObjectKind::Light(_) => "light",
            ObjectKind::Entity(_) => "entity",
            ObjectKind::Skeleton(_) => "skeleton",
            ObjectKind::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraData {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub aspect_ratio: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            fov_degrees: 49.0,
            near: 0.1,
            far: 100.0,
            aspect_ratio: 4.0 / 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    #[default]
    Point,
    Spot,
    Sun,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightData {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub casts_shadows: bool,
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 25.0,
            casts_shadows: false,
        }
    }
}

/// Renderable entity. The mesh is either referenced by name (resolved through
/// the scene's mesh library) or carried inline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityData {
    pub mesh_name: Option<String>,
    pub mesh: Option<MeshData>,
    pub material: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    #[serde(default)]
    pub vertices: Vec<[f32; 3]>,
    #[serde(default)]
    pub triangles: Vec<[u32; 3]>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn points(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| Vec3::from_array(*v))
    }

    /// Axis-aligned cube with the given half extent, 12 triangles.
    pub fn cube(half_extent: f32) -> Self {
        let h = half_extent;
        let vertices = vec![
            [-h, -h, -h],
            [h, -h, -h],
            [h, h, -h],
            [-h, h, -h],
            [-h, -h, h],
            [h, -h, h],
            [h, h, h],
            [-h, h, h],
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 6, 2],
            [3, 7, 6],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        Self {
            vertices,
            triangles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkeletonData {
    pub bones: Vec<String>,
}

/// Authored per-object metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProperties {
    pub layer: u32,
    pub active_layer: bool,
    /// Parent name saved at authoring time, resolved once at instantiation.
    pub parent_name: Option<String>,
    pub physics: PhysicsProperties,
}

impl Default for ObjectProperties {
    fn default() -> Self {
        Self {
            layer: 1,
            active_layer: true,
            parent_name: None,
            physics: PhysicsProperties::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicsKind {
    #[default]
    NoCollision,
    Static,
    Dynamic,
    Rigid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollisionShape {
    Box {
        #[serde(default = "default_half_extents")]
        half_extents: [f32; 3],
    },
    Sphere {
        #[serde(default = "default_radius")]
        radius: f32,
    },
    Capsule {
        #[serde(default = "default_radius")]
        radius: f32,
        #[serde(default = "default_radius")]
        half_height: f32,
    },
    ConvexHull,
    Mesh,
}

fn default_half_extents() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_radius() -> f32 {
    0.5
}

impl Default for CollisionShape {
    fn default() -> Self {
        CollisionShape::Box {
            half_extents: default_half_extents(),
        }
    }
}

impl CollisionShape {
    /// Shapes whose geometry is taken from the object's mesh.
    pub fn is_mesh_based(&self) -> bool {
        matches!(self, CollisionShape::ConvexHull | CollisionShape::Mesh)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsProperties {
    #[serde(default)]
    pub kind: PhysicsKind,
    #[serde(default)]
    pub shape: CollisionShape,
    /// No physical response. Ghost objects get a character controller.
    #[serde(default)]
    pub ghost: bool,
    #[serde(default)]
    pub sensor: bool,
    #[serde(default = "default_mass")]
    pub mass: f32,
    #[serde(default)]
    pub restitution: f32,
    #[serde(default = "default_friction")]
    pub friction: f32,
}

fn default_mass() -> f32 {
    1.0
}

fn default_friction() -> f32 {
    0.5
}

impl Default for PhysicsProperties {
    fn default() -> Self {
        Self {
            kind: PhysicsKind::NoCollision,
            shape: CollisionShape::default(),
            ghost: false,
            sensor: false,
            mass: default_mass(),
            restitution: 0.0,
            friction: default_friction(),
        }
    }
}

impl PhysicsProperties {
    pub fn is_physics_object(&self) -> bool {
        self.kind != PhysicsKind::NoCollision
    }
}

/// Owning scene of an object. `None` means free for adoption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Owner(pub Option<SceneId>);

/// Parent/child links. Non-owning.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    pub parent: Option<ObjectHandle>,
    pub children: Vec<ObjectHandle>,
}

/// Clone lifetime in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifeSpan {
    pub tick: u32,
    pub time_to_live: i32,
}

impl LifeSpan {
    pub fn new(time_to_live: i32) -> Self {
        Self {
            tick: 0,
            time_to_live,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.time_to_live <= 0
    }

    /// Count one frame. Returns true once the budget is exceeded.
    pub fn advance(&mut self) -> bool {
        self.tick = self.tick.saturating_add(1);
        !self.is_permanent() && self.tick as i64 > self.time_to_live as i64
    }
}

/// Marks a runtime-spawned duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOf(pub String);

/// Marks an object spawned for a group placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub group: String,
    pub placement: String,
}

/// Axis-aligned bounding box. The null box merges as the identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const NULL: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn is_null(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn merge(&mut self, other: &Aabb) {
        if other.is_null() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn merge_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut aabb = Aabb::NULL;
        for p in points {
            aabb.merge_point(p);
        }
        aabb
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// The twelve edges, as segment endpoint pairs.
    pub fn edges(&self) -> [(Vec3, Vec3); 12] {
        let (a, b) = (self.min, self.max);
        let c = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
        [
            (c(a.x, a.y, a.z), c(b.x, a.y, a.z)),
            (c(a.x, b.y, a.z), c(b.x, b.y, a.z)),
            (c(a.x, a.y, b.z), c(b.x, a.y, b.z)),
            (c(a.x, b.y, b.z), c(b.x, b.y, b.z)),
            (c(a.x, a.y, a.z), c(a.x, b.y, a.z)),
            (c(b.x, a.y, a.z), c(b.x, b.y, a.z)),
            (c(a.x, a.y, b.z), c(a.x, b.y, b.z)),
            (c(b.x, a.y, b.z), c(b.x, b.y, b.z)),
            (c(a.x, a.y, a.z), c(a.x, a.y, b.z)),
            (c(b.x, a.y, a.z), c(b.x, a.y, b.z)),
            (c(a.x, b.y, a.z), c(a.x, b.y, b.z)),
            (c(b.x, b.y, a.z), c(b.x, b.y, b.z)),
        ]
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Aabb::NULL
    }
}
