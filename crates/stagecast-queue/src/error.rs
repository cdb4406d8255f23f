use stagecast_core::SinkError;
use thiserror::Error;

use crate::types::EventKind;

/// Errors returned to producers.
#[derive(Debug, Error)]
pub enum QueueError {
    /// `stop()` has been called; no further events are accepted.
    #[error("event queue is closed")]
    Closed,

    /// Producers may not enqueue the shutdown sentinel themselves.
    #[error("event kind `{0}` is reserved for shutdown")]
    ReservedKind(EventKind),
}

impl QueueError {
    /// Short error code string used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::Closed => "QUEUE_CLOSED",
            QueueError::ReservedKind(_) => "RESERVED_KIND",
        }
    }
}

/// Failure while presenting one event. Logged by the worker, never returned
/// to producers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("broadcast failed: {0}")]
    Sink(#[from] SinkError),

    #[error("notification encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("broadcast sink panicked while emitting `{event}`")]
    Panicked { event: String },
}

pub type Result<T> = std::result::Result<T, QueueError>;
