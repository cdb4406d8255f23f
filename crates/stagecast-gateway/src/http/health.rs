use axum::{extract::State, Json};
use serde_json::{json, Value};
use stagecast_governor::HealthSnapshot;
use stagecast_queue::QueueStatus;
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check plus a one-line view of each component.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "queue": state.queue.status(),
        "connections": state.registry.stats(),
        "healthStatus": state.monitor.snapshot().health_status,
    }))
}

/// GET /metrics: full monitor snapshot.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<HealthSnapshot> {
    Json(state.monitor.snapshot())
}

/// GET /queue
pub async fn queue_handler(State(state): State<Arc<AppState>>) -> Json<QueueStatus> {
    Json(state.queue.status())
}
