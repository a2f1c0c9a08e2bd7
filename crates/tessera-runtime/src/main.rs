mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tessera_core::scene_file::{load_scene, SceneFile};
use tessera_sim::config::{load_config, load_or_default, ConfigError, EngineConfig};
use tessera_sim::engine::Engine;
use tessera_sim::error::SceneError;
use tessera_sim::headless::HeadlessHarness;
use tessera_sim::scripting::ScriptedLogic;

use cli::{CliArgs, Command};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    tracing::info!("Tessera runtime v{}", env!("CARGO_PKG_VERSION"));

    let result = match args.command {
        Command::Run {
            scene,
            frames,
            config,
            scripts,
            navigation,
        } => run(&scene, frames, config.as_deref(), &scripts, navigation),
        Command::Check { scene } => check(&scene),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn engine_config(explicit: Option<&Path>) -> Result<EngineConfig, SceneError> {
    let config = match explicit {
        Some(path) => load_config(path)?,
        None => load_or_default(&std::env::current_dir().map_err(ConfigError::Io)?)?,
    };
    Ok(config)
}

fn run(
    scene_path: &Path,
    frames: u64,
    config: Option<&Path>,
    scripts: &[(String, PathBuf)],
    navigation: bool,
) -> Result<(), SceneError> {
    let config = engine_config(config)?;
    let file = load_scene(scene_path)?;

    let HeadlessHarness {
        mut services,
        timer,
        render,
        ..
    } = HeadlessHarness::new(config);

    let mut logic = ScriptedLogic::new()?;
    for (name, path) in scripts {
        logic.register_file(name, path)?;
    }
    services.set_logic(Box::new(logic));

    let mut engine = Engine::new(services);
    let id = engine.load_scene_file(&file)?;
    let state = engine.instantiate(id)?;
    tracing::info!("Scene '{}' is {:?}", file.name, state);
    if navigation {
        engine.enable_navigation(id)?;
    }

    engine.run_frames(frames);

    if let Some(mesh) = engine.navigation_mesh(id) {
        println!(
            "navigation mesh v{}: {} walkable triangles, area {:.2}",
            mesh.version,
            mesh.walkable.len(),
            mesh.area
        );
    }
    engine.destroy_instance(id)?;

    println!(
        "{} frames, {} render calls",
        engine.frame_count(),
        render.borrow().calls.len()
    );
    println!("{}", timer.borrow().report());
    Ok(())
}

fn check(scene_path: &Path) -> Result<(), SceneError> {
    let file = load_scene(scene_path)?;
    print_summary(&file);
    Ok(())
}

fn print_summary(file: &SceneFile) {
    println!("scene '{}'", file.name);
    println!("  meshes:      {}", file.meshes.len());
    println!("  objects:     {}", file.objects.len());
    for object in &file.objects {
        println!("    {:<24} {:?}", object.name, object.resolved_type());
    }
    println!("  constraints: {}", file.constraints.len());
    println!(
        "  groups:      {} ({} placements)",
        file.groups.len(),
        file.group_instances.len()
    );
    if let Some(camera) = &file.main_camera {
        println!("  main camera: {}", camera);
    }
}
