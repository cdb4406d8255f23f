//! `stagecast-core`: configuration, error types, and the broadcast boundary
//! shared by the scheduler, the governor, and the gateway.

pub mod config;
pub mod error;
pub mod sink;
pub mod types;

pub use config::StagecastConfig;
pub use error::{Result, StagecastError};
pub use sink::{BroadcastSink, NullSink, SinkError};
pub use types::{ConnectionId, Metadata};
