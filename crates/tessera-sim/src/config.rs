//! `tessera.yaml` engine configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use glam::Vec3;
use tessera_core::environment::{ParseEnumError, ShadowTechnique, ViewportOrientation};

use crate::navmesh::NavMeshConfig;

pub const CONFIG_FILE_NAME: &str = "tessera.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Merge no-collision entities into per-material render batches.
    #[serde(default)]
    pub build_static_geometry: bool,
    #[serde(default)]
    pub enable_shadows: bool,
    #[serde(default = "default_shadow_technique")]
    pub shadow_technique: String,
    #[serde(default = "default_shadow_color")]
    pub shadow_color: [f32; 3],
    #[serde(default = "default_shadow_far_distance")]
    pub shadow_far_distance: f32,
    #[serde(default = "default_orientation")]
    pub viewport_orientation: String,
    /// Seconds per simulation tick.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: f32,
    #[serde(default = "default_init_script")]
    pub init_script: String,
    #[serde(default)]
    pub debug_physics: bool,
    #[serde(default = "default_window_size")]
    pub window_size: [u32; 2],
    #[serde(default)]
    pub navigation: NavMeshConfig,
    /// JSON lines file receiving lifecycle events.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
}

fn default_shadow_technique() -> String {
    "stencilmodulative".to_string()
}

fn default_shadow_color() -> [f32; 3] {
    [0.0, 0.0, 0.0]
}

fn default_shadow_far_distance() -> f32 {
    0.0
}

fn default_orientation() -> String {
    "portrait".to_string()
}

fn default_tick_rate() -> f32 {
    1.0 / 60.0
}

fn default_init_script() -> String {
    "OnInit.lua".to_string()
}

fn default_window_size() -> [u32; 2] {
    [800, 600]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            build_static_geometry: false,
            enable_shadows: false,
            shadow_technique: default_shadow_technique(),
            shadow_color: default_shadow_color(),
            shadow_far_distance: default_shadow_far_distance(),
            viewport_orientation: default_orientation(),
            tick_rate: default_tick_rate(),
            init_script: default_init_script(),
            debug_physics: false,
            window_size: default_window_size(),
            navigation: NavMeshConfig::default(),
            event_log: None,
        }
    }
}

impl EngineConfig {
    pub fn shadow_technique(&self) -> Result<ShadowTechnique, ConfigError> {
        Ok(self.shadow_technique.parse()?)
    }

    /// Shadow settings to apply, or `None` when shadows are disabled.
    pub fn shadow_settings(&self) -> Result<Option<ShadowSettings>, ConfigError> {
        if !self.enable_shadows {
            return Ok(None);
        }
        Ok(Some(ShadowSettings {
            technique: self.shadow_technique()?,
            color: Vec3::from_array(self.shadow_color),
            far_distance: self.shadow_far_distance,
        }))
    }

    pub fn viewport_orientation(&self) -> ViewportOrientation {
        ViewportOrientation::from_config(&self.viewport_orientation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSettings {
    pub technique: ShadowTechnique,
    pub color: Vec3,
    pub far_distance: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading tessera.yaml: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse tessera.yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    InvalidValue(#[from] ParseEnumError),
}

/// Walk up from `start_dir` looking for `tessera.yaml`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: EngineConfig = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Load the config found from `start_dir`, or defaults when there is none.
pub fn load_or_default(start_dir: &Path) -> Result<EngineConfig, ConfigError> {
    match find_config(start_dir) {
        Some(path) => {
            tracing::info!("Using config {:?}", path);
            load_config(&path)
        }
        None => Ok(EngineConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config: EngineConfig = serde_yaml::from_str("enable_shadows: true\n").unwrap();
        assert!(config.enable_shadows);
        assert_eq!(config.init_script, "OnInit.lua");
        assert_eq!(config.window_size, [800, 600]);
        let shadows = config.shadow_settings().unwrap().unwrap();
        assert_eq!(shadows.technique, ShadowTechnique::StencilModulative);
    }

    #[test]
    fn disabled_shadows_skip_validation() {
        let config = EngineConfig {
            shadow_technique: "bogus".to_string(),
            ..Default::default()
        };
        assert!(config.shadow_settings().unwrap().is_none());
        assert!(config.shadow_technique().is_err());
    }

    #[test]
    fn invalid_shadow_technique_is_a_config_error() {
        let config: EngineConfig =
            serde_yaml::from_str("enable_shadows: true\nshadow_technique: volumetric\n").unwrap();
        match config.shadow_settings() {
            Err(ConfigError::InvalidValue(e)) => assert_eq!(e.value, "volumetric"),
            other => panic!("expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn find_config_walks_up() {
        let root = std::env::temp_dir().join("tessera_config_walk");
        let nested = root.join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(CONFIG_FILE_NAME), "tick_rate: 0.02\n").unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, root.join(CONFIG_FILE_NAME));
        let config = load_config(&found).unwrap();
        assert!((config.tick_rate - 0.02).abs() < 1e-6);

        let _ = std::fs::remove_dir_all(&root);
    }
}
