use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagecast_core::{config::QueueConfig, Metadata};

/// Priority given to events when the producer does not pick one.
pub const DEFAULT_PRIORITY: i32 = 1;

/// What kind of state change an event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Poll,
    Screenshot,
    SessionUpdate,
    /// Shutdown sentinel; only `EventQueue::stop` creates it.
    Stop,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Poll => "poll",
            EventKind::Screenshot => "screenshot",
            EventKind::SessionUpdate => "session_update",
            EventKind::Stop => "stop",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "message" => Ok(EventKind::Message),
            "poll" => Ok(EventKind::Poll),
            "screenshot" => Ok(EventKind::Screenshot),
            "session_update" | "live_update" => Ok(EventKind::SessionUpdate),
            "stop" => Ok(EventKind::Stop),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// One unit of broadcastable state change. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Type-prefixed, e.g. `message-17`.
    pub id: String,
    /// Acceptance order under the queue lock; strictly increasing.
    pub seq: u64,
    pub kind: EventKind,
    pub payload: Metadata,
    pub enqueued_at: DateTime<Utc>,
    /// Carried for clients; dispatch order is FIFO regardless of priority.
    pub priority: i32,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_depth: usize,
    pub processing: bool,
    pub worker_alive: bool,
}

/// How long each kind of event stays on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldDurations {
    pub message: Duration,
    pub poll: Duration,
    pub screenshot: Duration,
    pub session_update: Duration,
}

impl HoldDurations {
    /// No holds at all; every event is emitted back to back.
    pub const ZERO: HoldDurations = HoldDurations {
        message: Duration::ZERO,
        poll: Duration::ZERO,
        screenshot: Duration::ZERO,
        session_update: Duration::ZERO,
    };

    pub fn for_kind(&self, kind: EventKind) -> Duration {
        match kind {
            EventKind::Message => self.message,
            EventKind::Poll => self.poll,
            EventKind::Screenshot => self.screenshot,
            EventKind::SessionUpdate => self.session_update,
            EventKind::Stop => Duration::ZERO,
        }
    }
}

impl From<&QueueConfig> for HoldDurations {
    fn from(config: &QueueConfig) -> Self {
        Self {
            message: Duration::from_millis(config.message_hold_ms),
            poll: Duration::from_millis(config.poll_hold_ms),
            screenshot: Duration::from_millis(config.screenshot_hold_ms),
            session_update: Duration::from_millis(config.session_update_hold_ms),
        }
    }
}

impl Default for HoldDurations {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}
