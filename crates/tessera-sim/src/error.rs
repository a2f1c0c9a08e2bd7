use tessera_core::components::SceneId;
use tessera_core::scene_file::SceneFileError;

use crate::config::ConfigError;

/// Hard failures surfaced by the engine. Content problems are logged and
/// skipped instead of being reported here.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    SceneFile(#[from] SceneFileError),
    #[error("unknown scene {0}")]
    UnknownScene(SceneId),
    #[error("script '{name}' failed: {message}")]
    Script { name: String, message: String },
    #[error("navigation worker: {0}")]
    Navigation(#[from] std::io::Error),
}
