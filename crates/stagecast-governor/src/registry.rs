//! Viewer presence tracking with admission control and idle reaping.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stagecast_core::{config::ConnectionsConfig, ConnectionId, Metadata};
use tracing::{debug, info, warn};

/// One live viewer connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub count: usize,
    pub max: usize,
    pub utilization_percent: f64,
}

/// Bounded set of connected viewers.
///
/// Every mutation happens under one lock, so admission is a single
/// check-and-insert: two concurrent connects can never both take the last
/// slot.
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, ConnectionRecord>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            max_connections,
        }
    }

    pub fn from_config(config: &ConnectionsConfig) -> Self {
        Self::new(config.max_connections)
    }

    /// Admit `id` unless the registry is full. Returns `false` without
    /// touching any state when at capacity.
    ///
    /// An id that is already present is refreshed in place and keeps its slot.
    pub fn try_connect(&self, id: ConnectionId, metadata: Metadata) -> bool {
        let mut connections = self.lock();
        let count = connections.len();
        if count >= self.max_connections {
            warn!(conn_id = %id, count, max = self.max_connections, "connection limit reached");
            return false;
        }
        let now = Utc::now();
        debug!(conn_id = %id, total = count + 1, "connection admitted");
        connections.insert(
            id.clone(),
            ConnectionRecord {
                id,
                connected_at: now,
                last_activity: now,
                metadata,
            },
        );
        true
    }

    /// Remove `id`. Returns whether a record was present.
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            debug!(conn_id = %id, "connection removed");
        }
        removed
    }

    /// Mark `id` as active now. Unknown ids are ignored.
    pub fn touch(&self, id: &ConnectionId) {
        self.touch_at(id, Utc::now());
    }

    pub(crate) fn touch_at(&self, id: &ConnectionId, at: DateTime<Utc>) {
        if let Some(record) = self.lock().get_mut(id) {
            record.last_activity = at;
        }
    }

    /// Remove every connection idle for longer than `idle_threshold`.
    pub fn reap_idle(&self, idle_threshold: Duration) -> usize {
        self.reap_idle_at(idle_threshold, Utc::now())
    }

    /// Like [`reap_idle`](Self::reap_idle), measured against `now`.
    pub fn reap_idle_at(&self, idle_threshold: Duration, now: DateTime<Utc>) -> usize {
        self.evict_idle_at(idle_threshold, now).len()
    }

    /// Remove connections idle past `idle_threshold` as of `now` and return
    /// their ids, so the owners of the matching sockets can be told.
    pub fn evict_idle_at(&self, idle_threshold: Duration, now: DateTime<Utc>) -> Vec<ConnectionId> {
        let Some(cutoff) = chrono::Duration::from_std(idle_threshold)
            .ok()
            .and_then(|threshold| now.checked_sub_signed(threshold))
        else {
            return Vec::new();
        };

        let (evicted, remaining) = {
            let mut connections = self.lock();
            let evicted: Vec<ConnectionId> = connections
                .values()
                .filter(|record| record.last_activity < cutoff)
                .map(|record| record.id.clone())
                .collect();
            for id in &evicted {
                connections.remove(id);
            }
            (evicted, connections.len())
        };
        if !evicted.is_empty() {
            info!(removed = evicted.len(), remaining, "reaped idle connections");
        }
        evicted
    }

    pub fn stats(&self) -> ConnectionStats {
        let count = self.lock().len();
        let utilization_percent = if self.max_connections == 0 {
            0.0
        } else {
            count as f64 / self.max_connections as f64 * 100.0
        };
        ConnectionStats {
            count,
            max: self.max_connections,
            utilization_percent,
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionRecord> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionRecord>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
