use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tessera", version, about = "Tessera - headless scene runner")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Instance a scene file and simulate it
    Run {
        /// Path to the scene YAML file
        scene: PathBuf,

        /// Number of frames to simulate
        #[arg(long, default_value_t = 60)]
        frames: u64,

        /// Engine config file (defaults to tessera.yaml in the current
        /// directory or its parents)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Lua script to register, as name=path. Repeatable.
        #[arg(long = "script", value_parser = parse_script)]
        scripts: Vec<(String, PathBuf)>,

        /// Build navigation geometry while running
        #[arg(long)]
        navigation: bool,
    },
    /// Parse a scene file and print a summary
    Check {
        /// Path to the scene YAML file
        scene: PathBuf,
    },
}

fn parse_script(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected name=path, got '{}'", arg)),
    }
}
