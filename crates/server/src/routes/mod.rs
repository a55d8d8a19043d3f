//! API route handlers for the ecosort server.

pub mod auth;
pub mod health;
pub mod metrics;
pub mod predict;
pub mod stream;
pub mod ws;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - GET  /metrics                     - Prometheus scrape (no auth)
/// - GET  /v1/health                   - Health check (no auth)
/// - GET  /v1/predict/config           - Classes, groupings, model versions
/// - POST /v1/predict                  - Classify one file
/// - POST /v1/predict/batch            - Start a batch job
/// - GET  /v1/predict/progress?jobID=  - Poll job progress
/// - POST /v1/predict/cancel?jobID=    - Cancel a running job
/// - GET  /v1/predict/websocket?jobID= - WebSocket progress subscriber
/// - GET  /v1/predict/stream?jobID=    - SSE progress subscriber
///
/// Everything under `/v1/predict` requires `X-API-Key` when a key is configured.
pub fn api_routes(state: Arc<AppState>) -> Router {
    let protected = predict::router(state.config.max_request_bytes)
        .route("/predict/websocket", get(ws::ws_handler))
        .route("/predict/stream", get(stream::stream_progress))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .nest("/v1", health::router().merge(protected))
        .merge(metrics::router())
        .with_state(state)
}
