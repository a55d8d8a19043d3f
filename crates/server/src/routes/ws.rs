// crates/server/src/routes/ws.rs
//! WebSocket progress subscriber.
//!
//! `GET /v1/predict/websocket?jobID=<id>` upgrades and binds the socket as the
//! job's subscriber. Each progress snapshot is sent as a JSON text frame; a
//! normal close frame follows the terminal snapshot. Client messages are
//! ignored except for close.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use ecosort_core::JobId;
use futures_util::{SinkExt, StreamExt};

use super::predict::JobQuery;
use crate::error::{ApiError, ApiResult};
use crate::jobs::{PushMessage, SubscriberHandle};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Response> {
    let job_id = query.parse()?;
    // Answer unknown jobs with a plain 404 instead of an upgraded socket.
    if !state.jobs.exists(&job_id) {
        return Err(ApiError::JobNotFound(job_id));
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, job_id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, job_id: JobId) {
    let (mut sink, mut stream) = socket.split();

    let (handle, mut rx) = SubscriberHandle::channel();
    let handle_id = handle.id();
    if let Err(e) = state.jobs.subscribe(job_id, handle) {
        // Evicted between the pre-check and the upgrade.
        tracing::debug!(job_id = %job_id, error = %e, "Subscribe failed after upgrade");
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "Job not found".into(),
            })))
            .await;
        return;
    }
    tracing::info!(job_id = %job_id, handle = handle_id, "WebSocket subscriber connected");

    // Forward pushes from the job engine to the socket
    let mut forward_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                PushMessage::Progress(progress) => {
                    let json = match serde_json::to_string(&progress) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize progress");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        return;
                    }
                }
                PushMessage::Close { reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: reason.into(),
                        })))
                        .await;
                    return;
                }
            }
        }
    });

    // Read until the client goes away; pongs are handled by axum
    let read_loop = async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    };

    tokio::select! {
        _ = &mut forward_task => {}
        _ = read_loop => forward_task.abort(),
    }

    // No-op if the runner already unbound us or a newer subscriber took over.
    state.jobs.unsubscribe(&job_id, handle_id);
    tracing::info!(job_id = %job_id, handle = handle_id, "WebSocket subscriber disconnected");
}
