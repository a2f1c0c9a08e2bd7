pub mod collaborators;
pub mod config;
pub mod constraints;
pub mod context;
pub mod debug;
pub mod directory;
pub mod engine;
pub mod error;
pub mod groups;
pub mod headless;
pub mod navmesh;
pub mod physics;
pub mod runtime;
pub mod scene;
pub mod scripting;
pub mod stats;
