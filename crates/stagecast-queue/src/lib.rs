//! `stagecast-queue`: the broadcast scheduler behind the live-show overlays.
//!
//! # Overview
//!
//! Request handlers [`enqueue`](EventQueue::enqueue) events concurrently. One
//! worker task drains them in acceptance order and presents each one:
//!
//! 1. "start" notification to the kind's room, plus a copy for everyone
//! 2. hold for the kind's display duration
//! 3. "end" notification with the same id
//!
//! so overlays never show two foreground elements at once.
//!
//! | Kind             | Room               | Default hold |
//! |------------------|--------------------|--------------|
//! | `Message`        | `overlay-messages` | 8 s          |
//! | `Poll`           | `overlay-polls`    | 30 s         |
//! | `Screenshot`     | everyone           | none         |
//! | `SessionUpdate`  | everyone           | none         |
//!
//! The `priority` field is carried on every event but dispatch is strictly
//! FIFO.

pub mod error;
mod presentation;
pub mod queue;
pub mod types;

pub use error::{HandlerError, QueueError, Result};
pub use queue::EventQueue;
pub use types::{Event, EventKind, HoldDurations, QueueStatus, DEFAULT_PRIORITY};
