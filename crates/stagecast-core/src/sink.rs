//! Delivery boundary between the core components and connected viewers.

use serde_json::Value;
use thiserror::Error;

/// A delivery attempt the sink could not even hand off.
///
/// "Nobody is listening" is not an error; sinks return `Ok` in that case.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("payload for {event} could not be encoded: {reason}")]
    Encode { event: String, reason: String },

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Fan-out target for notifications.
///
/// `scope` restricts delivery to one named room; `None` addresses the default
/// audience (every connected viewer). Callers never assume delivery happened.
pub trait BroadcastSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value, scope: Option<&str>) -> Result<(), SinkError>;
}

/// Sink that drops everything. Used when no viewers can be attached.
pub struct NullSink;

impl BroadcastSink for NullSink {
    fn emit(&self, _event: &str, _payload: Value, _scope: Option<&str>) -> Result<(), SinkError> {
        Ok(())
    }
}
