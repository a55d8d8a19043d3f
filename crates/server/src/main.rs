// crates/server/src/main.rs
//! Ecosort server binary.
//!
//! Loads configuration from the environment (and `.env`), connects the
//! model-server classifier behind the process-wide inference gate, and
//! serves the API until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use ecosort_core::{Classifier, HttpModelClassifier, SerializedClassifier, Taxonomy};
use ecosort_server::{create_app, init_metrics, AppConfig, AppState, LogFormat};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,ecosort_server=info";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_taxonomy(config: &AppConfig) -> Result<Taxonomy> {
    match &config.taxonomy_path {
        Some(path) => Taxonomy::load(path)
            .with_context(|| format!("loading taxonomy from {}", path.display())),
        None => Ok(Taxonomy::builtin()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real environment variables still apply.
    let dotenv = dotenvy::dotenv();

    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);
    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    init_metrics();

    let taxonomy = Arc::new(load_taxonomy(&config)?);
    tracing::info!(
        classes = taxonomy.classes.len(),
        model = taxonomy.latest_model().map(|m| m.version.as_str()).unwrap_or("unknown"),
        "Taxonomy loaded"
    );

    let backend = HttpModelClassifier::new(
        config.model_url.clone(),
        Arc::clone(&taxonomy),
        config.model_timeout,
    )?;
    let classifier: Arc<dyn Classifier> = Arc::new(SerializedClassifier::new(backend));
    // Startup continues without the model server; jobs fail their items
    // until it becomes reachable.
    match classifier.health_check().await {
        Ok(()) => tracing::info!(url = %config.model_url, "Model server reachable"),
        Err(e) => tracing::warn!(url = %config.model_url, error = %e, "Model server not ready"),
    }

    if config.api_key.is_none() {
        tracing::warn!("API_REQ_KEY is not set; prediction routes are unauthenticated");
    }

    let addr = config.bind_addr();
    tracing::info!(
        chunk_size = config.runner.chunk_size,
        pacing_ms = config.runner.pacing.as_millis() as u64,
        result_ttl_secs = config.result_ttl.as_secs(),
        upload_dir = %config.upload_dir.display(),
        "Job engine configured"
    );

    let state = AppState::new(config, classifier, taxonomy);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Ecosort server v{} listening on {addr}", env!("CARGO_PKG_VERSION"));

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
