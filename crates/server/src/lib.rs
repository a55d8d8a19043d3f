// crates/server/src/lib.rs
//! Ecosort server library.
//!
//! Batch classification job engine plus the Axum HTTP/WebSocket surface
//! that feeds it uploads and streams progress back to clients.

pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod upload;

pub use config::{AppConfig, ConfigError, LogFormat};
pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - `/v1` prediction, job and health routes
/// - `/metrics`
/// - CORS (allows any origin; the API key is the access control)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
