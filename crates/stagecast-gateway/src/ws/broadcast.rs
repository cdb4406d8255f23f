use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use stagecast_core::{BroadcastSink, SinkError};
use stagecast_protocol::frames::EventFrame;
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 256;

/// Fan-out of event frames to connected viewers.
///
/// Every viewer subscribes to the default channel; viewers that joined a room
/// also subscribe to that room's channel. Room channels are created on first
/// use.
pub struct EventBroadcaster {
    everyone: broadcast::Sender<String>,
    rooms: DashMap<String, broadcast::Sender<String>>,
    seq: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (everyone, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            everyone,
            rooms: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// New viewer subscribes to the default audience.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.everyone.subscribe()
    }

    pub fn subscribe_room(&self, room: &str) -> broadcast::Receiver<String> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    /// Monotonically increasing sequence shared by every outbound frame.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastSink for EventBroadcaster {
    /// Silently drops the frame when nobody is subscribed.
    fn emit(&self, event: &str, payload: Value, scope: Option<&str>) -> Result<(), SinkError> {
        let frame = EventFrame::new(event, payload)
            .with_seq(self.next_seq())
            .with_scope(scope);
        let text = serde_json::to_string(&frame).map_err(|e| SinkError::Encode {
            event: event.to_string(),
            reason: e.to_string(),
        })?;
        match scope {
            None => {
                let _ = self.everyone.send(text);
            }
            Some(room) => {
                if let Some(tx) = self.rooms.get(room) {
                    let _ = tx.send(text);
                }
            }
        }
        Ok(())
    }
}
