//! `stagecast-governor`: admission control and health monitoring.
//!
//! [`ConnectionRegistry`] bounds how many viewers may be attached and reaps
//! the ones that went quiet. [`HealthMonitor`] samples host load on a fixed
//! period, keeps request counters, raises deduplicated [`Alert`]s and
//! publishes a [`HealthSnapshot`] to the `admin` room on every tick.

pub mod alert;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod ring;
pub mod sampler;

pub use alert::{Alert, AlertKind, HealthStatus, Severity};
pub use error::SamplingError;
pub use monitor::{HealthMonitor, HealthSnapshot, MetricSample};
pub use registry::{ConnectionRecord, ConnectionRegistry, ConnectionStats};
pub use ring::RingBuffer;
pub use sampler::{SysinfoSampler, SystemReading, SystemSampler};
