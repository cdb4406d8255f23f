use clap::Parser;
use stagecast_core::StagecastConfig;
use stagecast_governor::SysinfoSampler;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

mod app;
mod error;
mod http;
mod reaper;
mod shutdown;
mod ws;

/// Live-show overlay gateway: paced broadcast queue, viewer rooms, health.
#[derive(Parser, Debug)]
#[command(name = "stagecast-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to stagecast.toml (falls back to STAGECAST_CONFIG, then ./stagecast.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override gateway.bind
    #[arg(long)]
    bind: Option<String>,

    /// Override gateway.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stagecast_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: --config > STAGECAST_CONFIG env > ./stagecast.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("STAGECAST_CONFIG").ok());
    let mut config = StagecastConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, code = e.code(), "config load failed, using defaults");
        StagecastConfig::default()
    });
    if let Some(bind) = cli.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let drain_timeout = config.queue.drain_timeout();

    let state = Arc::new(app::AppState::new(config, Box::new(SysinfoSampler::new())));
    state.queue.start();
    state.monitor.start();

    // reaper shares no lock with the queue; it only touches the registry
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reaper = tokio::spawn(reaper::run(Arc::clone(&state), shutdown_rx));

    let router = app::build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "stagecast gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = shutdown::wait_for_signal().await {
                error!(error = %e, "signal handler failed; shutting down");
            }
            info!("shutdown signal received");
        })
        .await?;

    // viewers stay attached while the queue drains so end notifications land
    info!(pending = state.queue.status().queue_depth, "draining event queue");
    if tokio::time::timeout(drain_timeout, state.queue.shutdown())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = drain_timeout.as_secs(),
            "event queue did not drain in time"
        );
    }
    state.monitor.shutdown().await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = reaper.await {
        error!(error = %e, "reaper task terminated abnormally");
    }
    info!("stagecast gateway stopped");
    Ok(())
}
