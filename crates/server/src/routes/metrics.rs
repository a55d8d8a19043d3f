// crates/server/src/routes/metrics.rs
//! Prometheus scrape endpoint, mounted at `/metrics` outside `/v1` and the
//! API key check.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::metrics::{render_metrics, set_active_jobs};
use crate::state::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics
///
/// Refreshes `ecosort_jobs_active` from the job engine before rendering, so
/// the gauge cannot drift when a runner is aborted. 503 until the recorder
/// is installed.
pub async fn scrape(State(state): State<Arc<AppState>>) -> Response {
    set_active_jobs(state.jobs.active_count());
    let Some(body) = render_metrics() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response();
    };
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response()
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(scrape))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::state::AppState;

    async fn get_metrics(config: AppConfig) -> (StatusCode, String, String) {
        crate::metrics::init_metrics();
        let app = crate::create_app(AppState::for_tests(config));
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get("content-type")
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_scrape_reports_active_jobs_gauge() {
        let (status, content_type, body) = get_metrics(AppConfig::default()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("ecosort_jobs_active"), "{body}");
    }

    #[tokio::test]
    async fn test_scrape_needs_no_api_key() {
        let config = AppConfig {
            api_key: Some("secret".into()),
            ..AppConfig::default()
        };
        let (status, _, _) = get_metrics(config).await;
        assert_eq!(status, StatusCode::OK);
    }
}
