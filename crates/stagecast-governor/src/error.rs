use thiserror::Error;

/// A system indicator could not be read this tick.
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("{indicator} reading unavailable: {reason}")]
    Unavailable { indicator: &'static str, reason: String },
}
