// crates/server/src/routes/health.rs
//! `GET /v1/health`: process liveness plus a job-engine summary.
//!
//! Open to unauthenticated callers. The model server is not contacted here;
//! an unreachable backend shows up as failed items on the next job.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// Jobs whose runner has not finished yet.
    pub active_jobs: usize,
    /// Backend name reported by the classifier, e.g. "tf-serving".
    pub classifier: String,
    pub chunk_size: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        active_jobs: state.jobs.active_count(),
        classifier: state.classifier.name().to_string(),
        chunk_size: state.config.runner.chunk_size,
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
