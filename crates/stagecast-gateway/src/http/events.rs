//! Producer endpoint: POST /events/{kind}
//!
//! Body: `{ "payload": {...}, "priority": 1 }` (`priority` optional).
//! Response: 202 `{ "id": "message-17" }`; 503 once the queue is closed.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use stagecast_core::Metadata;
use stagecast_queue::{EventKind, DEFAULT_PRIORITY};
use std::sync::Arc;

use crate::{app::AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub payload: Metadata,
    pub priority: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: String,
}

pub async fn enqueue_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(body): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let kind: EventKind = kind.parse().map_err(|_| ApiError::UnknownKind(kind))?;
    let id = state.queue.enqueue_with_priority(
        kind,
        body.payload,
        body.priority.unwrap_or(DEFAULT_PRIORITY),
    )?;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { id })))
}
