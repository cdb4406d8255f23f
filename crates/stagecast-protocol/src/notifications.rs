//! Overlay notification vocabulary: event names, rooms, and payload shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROOM_OVERLAY_MESSAGES: &str = "overlay-messages";
pub const ROOM_OVERLAY_POLLS: &str = "overlay-polls";
pub const ROOM_ADMIN: &str = "admin";

/// Rooms a viewer may join in addition to the default audience.
pub const JOINABLE_ROOMS: [&str; 3] = [ROOM_OVERLAY_MESSAGES, ROOM_OVERLAY_POLLS, ROOM_ADMIN];

pub const OVERLAY_MESSAGE: &str = "overlay_message";
pub const OVERLAY_MESSAGE_END: &str = "overlay_message_end";
pub const NEW_MESSAGE: &str = "new_message";
pub const OVERLAY_POLL: &str = "overlay_poll";
pub const OVERLAY_POLL_END: &str = "overlay_poll_end";
pub const NEW_POLL: &str = "new_poll";
pub const NEW_SCREENSHOT: &str = "new_screenshot";
pub const LIVE_UPDATED: &str = "live_updated";
pub const PERFORMANCE_METRICS: &str = "performance_metrics";
pub const TICK: &str = "tick";

/// "start" payload: the event is now on screen for `display_duration_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartNotice {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub display_duration_ms: u64,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
}

/// "end" payload: the event with this id has left the screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndNotice {
    pub id: String,
}
