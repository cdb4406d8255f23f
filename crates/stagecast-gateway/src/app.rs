use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use stagecast_core::{BroadcastSink, ConnectionId, StagecastConfig};
use stagecast_governor::{ConnectionRegistry, HealthMonitor, SystemSampler};
use stagecast_queue::EventQueue;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

use crate::ws::broadcast::EventBroadcaster;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: StagecastConfig,
    pub broadcaster: Arc<EventBroadcaster>,
    pub queue: EventQueue,
    pub registry: ConnectionRegistry,
    pub monitor: HealthMonitor,
    /// One close signal per open socket, fired when its record is reaped.
    evictions: DashMap<ConnectionId, Arc<Notify>>,
}

impl AppState {
    /// Wire the scheduler and the monitor to one broadcaster. Nothing is
    /// started here.
    pub fn new(config: StagecastConfig, sampler: Box<dyn SystemSampler>) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let sink: Arc<dyn BroadcastSink> = broadcaster.clone();
        let queue = EventQueue::new(&config.queue, Arc::clone(&sink));
        let registry = ConnectionRegistry::from_config(&config.connections);
        let monitor = HealthMonitor::new(config.monitor.clone(), sampler, sink);
        Self {
            config,
            broadcaster,
            queue,
            registry,
            monitor,
            evictions: DashMap::new(),
        }
    }

    /// Register a socket for eviction notice. The returned signal fires once
    /// the reaper drops `id` from the registry.
    pub fn eviction_signal(&self, id: &ConnectionId) -> Arc<Notify> {
        Arc::clone(self.evictions.entry(id.clone()).or_default().value())
    }

    pub fn forget_eviction_signal(&self, id: &ConnectionId) {
        self.evictions.remove(id);
    }

    /// Drop viewers idle past the configured threshold and tell their
    /// sockets to close. Returns how many were removed.
    pub fn reap_idle(&self) -> usize {
        self.reap_idle_at(Utc::now())
    }

    fn reap_idle_at(&self, now: DateTime<Utc>) -> usize {
        let evicted = self
            .registry
            .evict_idle_at(self.config.connections.idle_threshold(), now);
        for id in &evicted {
            if let Some((_, signal)) = self.evictions.remove(id) {
                signal.notify_one();
            }
        }
        if !evicted.is_empty() {
            self.publish_connection_count();
        }
        evicted.len()
    }

    /// Push the registry's current size to the monitor gauge.
    pub fn publish_connection_count(&self) {
        self.monitor.set_active_connections(self.registry.len());
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/metrics", get(crate::http::health::metrics_handler))
        .route("/queue", get(crate::http::health::queue_handler))
        .route("/events/{kind}", post(crate::http::events::enqueue_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Feed every request's latency and outcome into the health monitor.
async fn track_request(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
    state
        .monitor
        .record_request(elapsed_ms, response.status().is_server_error());
    response
}
