use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use stonegate_config::{init_tracing, CoreConfig};
use stonegate_core::{loader, DeviceRegistry, PhysicsEngine, Recorder};
use stonegate_server::StonegateServer;
use tracing::{info, warn};

/// Silicon-photonic / QEC demonstrator backend.
#[derive(Parser, Debug)]
#[command(name = "stonegate-server", version)]
struct Args {
    /// Path to a stonegate.toml config file, overriding the discovered one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device-graph document to load, overriding STONEGATE_GRAPH_PATH.
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Seed for simulated-device RNGs; 0 seeds from the clock.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("info");

    let config = CoreConfig::load_from(args.config.as_deref())?;
    info!(port = config.port, "loaded configuration");

    let registry = Arc::new(DeviceRegistry::new());
    let physics = Arc::new(PhysicsEngine::new());

    if let Some(graph_path) = loader::resolve_graph_path(args.graph.or(config.graph_path.clone())) {
        if graph_path.exists() {
            loader::load_device_graph(&graph_path, &registry, &physics, args.seed)?;
        } else {
            warn!(path = %graph_path.display(), "device-graph path does not exist, starting with an empty registry");
            physics.start_background_loop(std::time::Duration::from_millis(config.interval_ms));
        }
    } else {
        physics.start_background_loop(std::time::Duration::from_millis(config.interval_ms));
    }

    std::fs::create_dir_all(&config.recordings_dir)?;
    let recorder = Arc::new(Recorder::new(
        Arc::clone(&registry),
        config.recordings_dir.clone(),
        config.port,
        config.build_info.git_commit.clone(),
        config.build_info.build_time.clone(),
    ));

    let server = StonegateServer::new(
        registry,
        physics,
        recorder,
        config.port,
        config.build_info.git_commit.clone(),
        config.build_info.build_time.clone(),
    );

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    server.start(addr).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    server.stop().await;

    Ok(())
}
