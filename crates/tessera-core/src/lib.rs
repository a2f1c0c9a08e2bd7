pub mod components;
pub mod environment;
pub mod events;
pub mod scene_file;
