// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use ecosort_core::{Classifier, Taxonomy};

use crate::config::AppConfig;
use crate::jobs::JobService;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: AppConfig,
    /// Batch job facade (store, subscriber registry, runners).
    pub jobs: Arc<JobService>,
    /// Backend used directly by the single-item route. Batch jobs share the
    /// same instance through `jobs`, so the inference gate is process-wide.
    pub classifier: Arc<dyn Classifier>,
    pub taxonomy: Arc<Taxonomy>,
}

impl AppState {
    /// Create the state with an in-memory job engine wrapped in an Arc for sharing.
    pub fn new(config: AppConfig, classifier: Arc<dyn Classifier>, taxonomy: Arc<Taxonomy>) -> Arc<Self> {
        let jobs = JobService::in_memory(Arc::clone(&classifier), config.runner, config.result_ttl);
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            jobs: Arc::new(jobs),
            classifier,
            taxonomy,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
impl AppState {
    /// State backed by the scripted test classifier, with no chunk pacing.
    pub(crate) fn for_tests(config: AppConfig) -> Arc<Self> {
        use crate::jobs::runner::tests::ScriptedClassifier;
        use crate::jobs::RunnerConfig;

        let config = AppConfig {
            runner: RunnerConfig {
                chunk_size: config.runner.chunk_size,
                pacing: std::time::Duration::ZERO,
            },
            upload_dir: std::env::temp_dir().join("ecosort-tests"),
            ..config
        };
        Self::new(config, Arc::new(ScriptedClassifier::new()), Arc::new(Taxonomy::builtin()))
    }
}
