use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use stagecast_protocol::frames::ErrorShape;
use stagecast_queue::QueueError;
use thiserror::Error;

/// Errors surfaced to HTTP and WebSocket clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    #[error("unknown room: {0}")]
    UnknownRoom(String),

    #[error("admin token missing or invalid")]
    Unauthorized,

    #[error("connection limit of {max} reached")]
    CapacityExceeded { max: usize },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Queue(QueueError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Queue(QueueError::ReservedKind(_)) => StatusCode::BAD_REQUEST,
            ApiError::UnknownKind(_) | ApiError::UnknownRoom(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Queue(e) => e.code(),
            ApiError::UnknownKind(_) => "UNKNOWN_KIND",
            ApiError::UnknownRoom(_) => "UNKNOWN_ROOM",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorShape::new(self.code(), self.to_string()))).into_response()
    }
}
