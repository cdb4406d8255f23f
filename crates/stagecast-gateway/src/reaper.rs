use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::app::AppState;

/// Periodically drop viewers idle past the configured threshold and close
/// their sockets. Runs until `shutdown` broadcasts `true` or its sender goes
/// away.
pub async fn run(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let idle = state.config.connections.idle_threshold();
    let mut interval = tokio::time::interval(state.config.connections.reap_interval());
    // first tick completes immediately; nothing can be idle yet
    interval.tick().await;
    info!(idle_secs = idle.as_secs(), "idle connection reaper started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if state.reap_idle() == 0 {
                    debug!("no idle connections");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("idle connection reaper stopped");
}
