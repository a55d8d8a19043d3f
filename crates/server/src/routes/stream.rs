// crates/server/src/routes/stream.rs
//! SSE progress subscriber for clients that cannot hold a WebSocket.
//!
//! `GET /v1/predict/stream?jobID=<id>` emits `progress` events carrying the
//! JSON snapshot and a final `close` event.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use ecosort_core::JobId;

use super::predict::JobQuery;
use crate::error::ApiResult;
use crate::jobs::{JobService, PushMessage, SubscriberHandle};
use crate::state::AppState;

/// Releases the binding when the client drops the stream.
struct Unsubscribe {
    jobs: Arc<JobService>,
    job_id: JobId,
    handle_id: u64,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.jobs.unsubscribe(&self.job_id, self.handle_id);
    }
}

pub async fn stream_progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    let job_id = query.parse()?;
    let (handle, rx) = SubscriberHandle::channel();
    let guard = Unsubscribe {
        jobs: Arc::clone(&state.jobs),
        job_id,
        handle_id: handle.id(),
    };
    state.jobs.subscribe(job_id, handle)?;

    let stream = async_stream::stream! {
        let _guard = guard;
        let mut rx = rx;
        while let Some(message) = rx.recv().await {
            match message {
                PushMessage::Progress(progress) => match serde_json::to_string(&progress) {
                    Ok(json) => {
                        yield Ok(Event::default().event("progress").data(json));
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Failed to serialize progress");
                    }
                },
                PushMessage::Close { reason } => {
                    yield Ok(Event::default().event("close").data(reason));
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
