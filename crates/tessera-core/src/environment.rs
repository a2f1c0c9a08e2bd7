//! Scene-wide environment settings: colors, gravity, fog, sky, shadows and
//! viewport orientation.

use std::str::FromStr;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Environment properties cached while a scene is not instanced and applied
/// when it is.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentProps {
    pub world_color: Vec3,
    pub ambient_color: Vec3,
    pub gravity: Vec3,
    pub fog: FogParams,
    pub sky: Option<SkyParams>,
    pub sound: SoundProps,
}

impl Default for EnvironmentProps {
    fn default() -> Self {
        Self {
            world_color: Vec3::new(0.05, 0.05, 0.05),
            ambient_color: Vec3::new(0.2, 0.2, 0.2),
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fog: FogParams::default(),
            sky: None,
            sound: SoundProps::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FogMode {
    #[default]
    None,
    Linear,
    Exponential,
    Quadratic,
}

impl FromStr for FogMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(FogMode::None),
            "linear" | "lin" => Ok(FogMode::Linear),
            "exponential" | "exp" => Ok(FogMode::Exponential),
            "quadratic" | "quad" => Ok(FogMode::Quadratic),
            _ => Err(ParseEnumError {
                kind: "fog mode",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogParams {
    #[serde(default)]
    pub mode: FogMode,
    #[serde(default = "default_fog_color")]
    pub color: [f32; 3],
    #[serde(default = "default_fog_intensity")]
    pub intensity: f32,
    #[serde(default)]
    pub start: f32,
    #[serde(default = "default_fog_end")]
    pub end: f32,
}

fn default_fog_color() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_fog_intensity() -> f32 {
    1.0
}

fn default_fog_end() -> f32 {
    100.0
}

impl Default for FogParams {
    fn default() -> Self {
        Self {
            mode: FogMode::None,
            color: default_fog_color(),
            intensity: default_fog_intensity(),
            start: 0.0,
            end: default_fog_end(),
        }
    }
}

/// Sky backdrop drawn behind everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyParams {
    pub material: String,
    pub distance: f32,
    pub orientation: Quat,
}

impl SkyParams {
    pub fn new(material: impl Into<String>) -> Self {
        Self {
            material: material.into(),
            distance: 5000.0,
            orientation: Quat::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    None,
    #[default]
    InverseClamped,
    Linear,
    Exponent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundProps {
    #[serde(default = "default_doppler")]
    pub doppler_factor: f32,
    #[serde(default = "default_speed_of_sound")]
    pub speed_of_sound: f32,
    #[serde(default)]
    pub distance_model: DistanceModel,
}

fn default_doppler() -> f32 {
    1.0
}

fn default_speed_of_sound() -> f32 {
    343.3
}

impl Default for SoundProps {
    fn default() -> Self {
        Self {
            doppler_factor: default_doppler(),
            speed_of_sound: default_speed_of_sound(),
            distance_model: DistanceModel::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowTechnique {
    None,
    StencilModulative,
    StencilAdditive,
    TextureModulative,
    TextureAdditive,
    TextureModulativeIntegrated,
    TextureAdditiveIntegrated,
}

impl FromStr for ShadowTechnique {
    type Err = ParseEnumError;

    /// Case-insensitive; hyphens and underscores are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "none" => Ok(ShadowTechnique::None),
            "stencilmodulative" => Ok(ShadowTechnique::StencilModulative),
            "stenciladditive" => Ok(ShadowTechnique::StencilAdditive),
            "texturemodulative" => Ok(ShadowTechnique::TextureModulative),
            "textureadditive" => Ok(ShadowTechnique::TextureAdditive),
            "texturemodulativeintegrated" => Ok(ShadowTechnique::TextureModulativeIntegrated),
            "textureadditiveintegrated" => Ok(ShadowTechnique::TextureAdditiveIntegrated),
            _ => Err(ParseEnumError {
                kind: "shadow technique",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewportOrientation {
    #[default]
    Portrait,
    LandscapeLeft,
    LandscapeRight,
}

impl ViewportOrientation {
    /// Map a configured orientation name onto the viewport orientation.
    ///
    /// The two landscape names are deliberately crossed: the display layer
    /// rotates in the opposite sense to the names used in configuration.
    /// Unknown names fall back to portrait.
    pub fn from_config(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "landscaperight" => ViewportOrientation::LandscapeLeft,
            "landscapeleft" => ViewportOrientation::LandscapeRight,
            _ => ViewportOrientation::Portrait,
        }
    }
}
