use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use stagecast_core::{
    config::{HEARTBEAT_INTERVAL_SECS, MAX_PAYLOAD_BYTES},
    ConnectionId, Metadata,
};
use stagecast_protocol::{
    frames::{EventFrame, InboundFrame},
    notifications::{JOINABLE_ROOMS, ROOM_ADMIN, TICK},
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::{app::AppState, error::ApiError};

type WsSink = SplitSink<WebSocket, Message>;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Room to join in addition to the default audience.
    pub scope: Option<String>,
    pub token: Option<String>,
}

/// Axum handler: GET /ws?scope=&token=
///
/// Room and admission checks run before the upgrade so a rejected viewer gets
/// a plain HTTP error instead of a socket that closes immediately.
pub async fn ws_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let room = match resolve_room(&state, &params) {
        Ok(room) => room,
        Err(e) => return e.into_response(),
    };

    let conn_id = ConnectionId::new();
    let mut metadata = Metadata::new();
    metadata.insert("room".into(), room.unwrap_or("default").into());
    if !state.registry.try_connect(conn_id.clone(), metadata) {
        return ApiError::CapacityExceeded {
            max: state.config.connections.max_connections,
        }
        .into_response();
    }

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            state.registry.disconnect(&conn_id);
            return rejection.into_response();
        }
    };
    state.publish_connection_count();

    let failed = (Arc::clone(&state), conn_id.clone());
    ws.on_failed_upgrade(move |e| {
        let (state, conn_id) = failed;
        warn!(conn_id = %conn_id, error = %e, "websocket upgrade failed");
        state.registry.disconnect(&conn_id);
        state.publish_connection_count();
    })
    .on_upgrade(move |socket| run_connection(socket, state, conn_id, room))
}

fn resolve_room(state: &AppState, params: &WsParams) -> Result<Option<&'static str>, ApiError> {
    let room = match params.scope.as_deref() {
        None | Some("") | Some("default") => return Ok(None),
        Some(scope) => JOINABLE_ROOMS
            .iter()
            .copied()
            .find(|r| *r == scope)
            .ok_or_else(|| ApiError::UnknownRoom(scope.to_string()))?,
    };
    if room == ROOM_ADMIN {
        if let Some(expected) = state.config.gateway.admin_token.as_deref() {
            if params.token.as_deref() != Some(expected) {
                return Err(ApiError::Unauthorized);
            }
        }
    }
    Ok(Some(room))
}

/// Per-viewer loop. Lives until the socket closes or the record is reaped.
async fn run_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    conn_id: ConnectionId,
    room: Option<&'static str>,
) {
    info!(conn_id = %conn_id, room = room.unwrap_or("default"), "viewer connected");

    let (mut tx, mut rx) = socket.split();
    let mut everyone = state.broadcaster.subscribe();
    let mut room_rx = room.map(|r| state.broadcaster.subscribe_room(r));
    let evicted = state.eviction_signal(&conn_id);

    let mut tick = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id = %conn_id, size = text.len(), "payload too large");
                            break;
                        }
                        state.registry.touch(&conn_id);
                        match serde_json::from_str::<InboundFrame>(&text) {
                            Ok(frame) => debug!(conn_id = %conn_id, frame_type = %frame.frame_type, "inbound frame"),
                            Err(e) => debug!(conn_id = %conn_id, error = %e, "malformed frame ignored"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        state.registry.touch(&conn_id);
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => state.registry.touch(&conn_id),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }

            event = everyone.recv() => {
                if !forward(&mut tx, event, &conn_id).await {
                    break;
                }
            }

            event = recv_room(&mut room_rx) => {
                if !forward(&mut tx, event, &conn_id).await {
                    break;
                }
            }

            _ = evicted.notified() => {
                info!(conn_id = %conn_id, "connection reaped; closing socket");
                let _ = tx.send(Message::Close(None)).await;
                break;
            }

            _ = tick.tick() => {
                let frame = EventFrame::new(
                    TICK,
                    serde_json::json!({ "ts": chrono::Utc::now().timestamp_millis() }),
                )
                .with_seq(state.broadcaster.next_seq());
                let text = serde_json::to_string(&frame).unwrap_or_default();
                if tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.forget_eviction_signal(&conn_id);
    state.registry.disconnect(&conn_id);
    state.publish_connection_count();
    info!(conn_id = %conn_id, "viewer disconnected");
}

async fn recv_room(rx: &mut Option<broadcast::Receiver<String>>) -> Result<String, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Push one broadcast frame to the socket. Returns `false` once the
/// connection should be torn down.
async fn forward(tx: &mut WsSink, event: Result<String, RecvError>, conn_id: &ConnectionId) -> bool {
    match event {
        Ok(text) => tx.send(Message::Text(text.into())).await.is_ok(),
        Err(RecvError::Lagged(skipped)) => {
            warn!(conn_id = %conn_id, skipped, "viewer lagging; frames dropped");
            true
        }
        Err(RecvError::Closed) => false,
    }
}
