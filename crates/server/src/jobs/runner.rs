// crates/server/src/jobs/runner.rs
//! Drives one batch job from first chunk to terminal status.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ecosort_core::{
    percent_complete, Classifier, ItemResult, ItemStatus, JobId, JobProgress, JobStatus,
    PreparedItem, ProgressUpdate,
};
use tokio_util::sync::CancellationToken;

use super::registry::SubscriberRegistry;
use super::store::JobStore;
use crate::metrics;

pub const CANCELLED_REASON: &str = "job cancelled";

/// Chunking and pacing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Items per progress step. Zero is treated as one.
    pub chunk_size: usize,
    /// Delay between chunks. Zero disables pacing.
    pub pacing: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            pacing: Duration::from_secs(1),
        }
    }
}

/// Executes jobs against a classifier, writing every step to the store and
/// pushing it to whichever subscriber is bound at that moment.
pub struct BatchRunner {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn JobStore>,
    registry: Arc<dyn SubscriberRegistry>,
    config: RunnerConfig,
}

impl BatchRunner {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn JobStore>,
        registry: Arc<dyn SubscriberRegistry>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            classifier,
            store,
            registry,
            config,
        }
    }

    /// Run `items` to a terminal state and return the terminal snapshot.
    ///
    /// Never leaves the job `Running`: an unreachable backend fails every
    /// item, and cancellation fails whatever has not been processed yet.
    #[tracing::instrument(skip_all, fields(job_id = %job_id, items = items.len()))]
    pub async fn run(
        &self,
        job_id: JobId,
        items: &[PreparedItem],
        cancel: &CancellationToken,
    ) -> JobProgress {
        let started = Instant::now();
        let total = items.len();

        if let Err(e) = self.classifier.health_check().await {
            tracing::warn!(backend = self.classifier.name(), error = %e, "Classifier unavailable, failing job");
            let reason = format!("classifier unavailable: {e}");
            let results = fail_all(items, &reason);
            return self.finish(job_id, JobStatus::Completed, results, started);
        }

        let chunk_size = self.config.chunk_size.max(1);
        let chunk_count = total.div_ceil(chunk_size);
        let mut processed = 0;

        for (index, chunk) in items.chunks(chunk_size).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(processed, total, "Job cancelled at chunk boundary");
                let results = fail_all(&items[processed..], CANCELLED_REASON);
                return self.finish(job_id, JobStatus::Stopped, results, started);
            }

            let mut results = Vec::with_capacity(chunk.len());
            for item in chunk {
                results.push(self.classify_item(item).await);
            }
            processed += chunk.len();

            let update = ProgressUpdate::running(percent_complete(processed, total), results);
            let snapshot = self.store.upsert(job_id, update);
            tracing::debug!(
                chunk = index + 1,
                chunks = chunk_count,
                percent = snapshot.progress_percent,
                "Chunk complete"
            );
            self.notify(&snapshot);

            if index + 1 < chunk_count && !self.config.pacing.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.pacing) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        // A cancel that lands during the last chunk still stops the job.
        let status = if cancel.is_cancelled() {
            tracing::info!(processed, total, "Job cancelled after its last chunk");
            JobStatus::Stopped
        } else {
            JobStatus::Completed
        };
        self.finish(job_id, status, Vec::new(), started)
    }

    /// Terminate a job whose runner died. Items past the last recorded
    /// result are marked failed with `reason`. Returns `None` if the job had
    /// already reached a terminal state.
    pub fn abandon(
        &self,
        job_id: JobId,
        items: &[PreparedItem],
        reason: &str,
        started: Instant,
    ) -> Option<JobProgress> {
        // Chunks run in order, so recorded results are always a prefix of `items`.
        let processed = match self.store.get(&job_id) {
            Some(progress) if progress.is_terminal() => return None,
            Some(progress) => progress.results.len().min(items.len()),
            None => 0,
        };
        let results = fail_all(&items[processed..], reason);
        Some(self.finish(job_id, JobStatus::Completed, results, started))
    }

    async fn classify_item(&self, item: &PreparedItem) -> ItemResult {
        match self.classifier.classify(item).await {
            Ok(label) => {
                metrics::record_item(ItemStatus::Completed);
                ItemResult::completed(item.name(), label.name)
            }
            Err(e) => {
                tracing::warn!(item = item.name(), error = %e, "Item classification failed");
                metrics::record_item(ItemStatus::Failed);
                ItemResult::failed(item.name(), e.to_string())
            }
        }
    }

    /// Best-effort push of a non-terminal snapshot.
    fn notify(&self, snapshot: &JobProgress) {
        let Some(handle) = self.registry.lookup(&snapshot.job_id) else {
            return;
        };
        if let Err(e) = handle.push(snapshot.clone()) {
            tracing::debug!(error = %e, "Dropping unreachable subscriber");
            metrics::record_push_failure();
            self.registry.release(&snapshot.job_id, e.handle_id);
        }
    }

    fn finish(
        &self,
        job_id: JobId,
        status: JobStatus,
        results: Vec<ItemResult>,
        started: Instant,
    ) -> JobProgress {
        let snapshot = self.store.upsert(job_id, ProgressUpdate::finished(status, results));

        // The store write must precede the unbind: a subscriber binding after
        // this point re-reads the store and delivers the terminal snapshot itself.
        if let Some(handle) = self.registry.unbind(&job_id) {
            if handle.push(snapshot.clone()).is_err() {
                metrics::record_push_failure();
            }
            handle.close(close_reason(status));
        }

        metrics::record_job_finished(status, started.elapsed());
        tracing::info!(
            job_id = %job_id,
            status = status.as_str(),
            results = snapshot.results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job finished"
        );
        snapshot
    }
}

pub(crate) fn close_reason(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Stopped => "Job stopped",
        _ => "Job completed",
    }
}

fn fail_all(items: &[PreparedItem], reason: &str) -> Vec<ItemResult> {
    items
        .iter()
        .map(|item| {
            metrics::record_item(ItemStatus::Failed);
            ItemResult::failed(item.name(), reason)
        })
        .collect()
}
