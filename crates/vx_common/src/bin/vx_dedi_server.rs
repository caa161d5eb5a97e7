//! The Voxelia dedicated server: an authoritative chunk service behind the RPC edge.

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bevy_math::DVec3;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vx_common::config::GameConfig;
use vx_common::modules::{ModuleContext, ModuleLoader};
use vx_common::network::server::RpcServer;
use vx_common::observer::Observer;
use vx_common::service::ChunkService;
use vx_common::world::storage::DiskWorldStorage;
use vx_common::world::streamer::{self, StreamingMode};
use vx_common::worldgen::BaseContentModule;
use vx_schemas::registry::BlockRegistry;

#[derive(Parser)]
#[command(name = "vx_dedi_server", about = "Voxelia dedicated server", version)]
struct Args {
    /// Path of the TOML configuration file.
    #[arg(long, default_value = "voxelia.toml")]
    config: PathBuf,
    /// Directory holding the per-world chunk storage.
    #[arg(long, default_value = "worlds")]
    data_dir: PathBuf,
    /// Name of the world to serve.
    #[arg(long, default_value = "main")]
    world: String,
    /// World generation seed.
    #[arg(long, default_value_t = 123456789)]
    seed: u32,
    /// Overrides `server.port` from the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut config = GameConfig::load_or_default(&args.config)
        .with_context(|| format!("Loading configuration from {}", args.config.display()))?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let version = format!(
        "{}.{}.{}",
        vx_common::GAME_VERSION_MAJOR,
        vx_common::GAME_VERSION_MINOR,
        vx_common::GAME_VERSION_PATCH
    );
    info!(version = %version, "Starting the {} dedicated server", vx_common::GAME_BRAND_NAME);

    // Content modules populate the block registry and the terrain generator.
    let mut blocks = BlockRegistry::default();
    let mut loader = ModuleLoader::new();
    loader.add(Box::new(BaseContentModule::new(args.seed)));
    let report = loader.load_all(&mut ModuleContext { blocks: &mut blocks });
    info!(loaded = report.loaded.len(), skipped = report.skipped.len(), "Modules loaded");
    for (name, reason) in &report.skipped {
        warn!(module = %name, %reason, "Module skipped");
    }

    let config_handle = config.clone().new_handle();
    let service = ChunkService::new_default(true, config.update_thread_number);
    let world_id = service.worlds_mut().create_world(&args.world).id();
    let storage = Arc::new(
        DiskWorldStorage::open(&args.data_dir, &args.world)
            .with_context(|| format!("Opening world storage under {}", args.data_dir.display()))?,
    );

    // A stationary flying observer keeps the spawn region resident; everything else
    // materializes on demand through the RPC get_chunk handler.
    // TODO: anchor streamers to connected players instead of the spawn point.
    let spawn_observer = Arc::new(Observer::new(DVec3::new(0.0, 48.0, 0.0)));
    spawn_observer.set_flying(true);
    streamer::register_observer_tasks(
        &service,
        world_id,
        &spawn_observer,
        &config_handle,
        StreamingMode::authority(storage),
    );

    let rpc = RpcServer::start(
        Arc::clone(&service),
        config.server.port,
        config.server.rpc_thread_number,
    )?;
    service.start();
    info!(world = %args.world, world_id, "Server ready; type \"stop\" to shut down");

    // Drive the render drain and periodic diagnostics from the main thread while
    // waiting for the stop command.
    let stdin_lines = std::io::stdin().lock().lines();
    let mut last_stats = std::time::Instant::now();
    for line in stdin_lines {
        let Ok(line) = line else { break };
        match line.trim() {
            "stop" => break,
            "" => {}
            other => warn!("Unknown command: {other}"),
        }
        service.handle_render_tasks();
        if last_stats.elapsed() > Duration::from_secs(10) {
            let stats = service.dispatcher().stats();
            info!(
                ticks = stats.completed_ticks,
                skipped = stats.skipped_ticks,
                write_time = ?stats.write_time,
                "Scheduler diagnostics"
            );
            last_stats = std::time::Instant::now();
        }
    }

    info!("Shutting down");
    rpc.shutdown();
    service.shutdown();
    Ok(())
}
