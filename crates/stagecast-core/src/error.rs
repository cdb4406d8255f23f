use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagecastError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StagecastError {
    /// Short error code string used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            StagecastError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, StagecastError>;
