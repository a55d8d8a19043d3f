// crates/server/src/jobs/service.rs
//! Job facade: the only entry point the transport layer uses.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use ecosort_core::{Classifier, JobId, JobProgress, PreparedItem};
use tokio_util::sync::CancellationToken;

use super::registry::{InMemorySubscriberRegistry, SubscriberRegistry};
use super::runner::{close_reason, BatchRunner, RunnerConfig};
use super::store::{InMemoryJobStore, JobStore};
use super::types::{JobError, JobRequest, SubscribeOutcome, SubscriberHandle};
use crate::metrics;

pub const SUPERSEDED_REASON: &str = "Superseded by a newer subscriber";

/// Creates jobs, attaches subscribers, answers polls.
///
/// Each job runs in its own task. A supervising task waits for it, records
/// a terminal state if the runner panicked, runs the upload cleanup hook,
/// and evicts the record once the retention window has passed.
pub struct JobService {
    store: Arc<dyn JobStore>,
    registry: Arc<dyn SubscriberRegistry>,
    runner: Arc<BatchRunner>,
    active: RwLock<HashMap<JobId, CancellationToken>>,
    retention: Duration,
}

impl JobService {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn JobStore>,
        registry: Arc<dyn SubscriberRegistry>,
        config: RunnerConfig,
        retention: Duration,
    ) -> Self {
        let runner = BatchRunner::new(classifier, Arc::clone(&store), Arc::clone(&registry), config);
        Self {
            store,
            registry,
            runner: Arc::new(runner),
            active: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Service backed by the process-local store and registry.
    pub fn in_memory(
        classifier: Arc<dyn Classifier>,
        config: RunnerConfig,
        retention: Duration,
    ) -> Self {
        Self::new(
            classifier,
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemorySubscriberRegistry::new()),
            config,
            retention,
        )
    }

    /// Start a job and return its ID immediately.
    pub fn create_job(self: &Arc<Self>, request: JobRequest) -> JobId {
        let job_id = JobId::new();
        let JobRequest { items, cleanup } = request;
        let items: Arc<[PreparedItem]> = items.into();
        let cancel = CancellationToken::new();

        match self.active.write() {
            Ok(mut active) => {
                active.insert(job_id, cancel.clone());
            }
            Err(e) => tracing::error!("RwLock poisoned writing active jobs: {e}"),
        }
        metrics::record_job_created(items.len());
        tracing::info!(job_id = %job_id, items = items.len(), "Job created");

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let run = {
                let runner = Arc::clone(&service.runner);
                let items = Arc::clone(&items);
                tokio::spawn(async move { runner.run(job_id, &items, &cancel).await })
            };

            if let Err(e) = run.await {
                tracing::error!(job_id = %job_id, error = %e, "Batch runner crashed");
                service
                    .runner
                    .abandon(job_id, &items, &format!("job aborted: {e}"), started);
            }

            match service.active.write() {
                Ok(mut active) => {
                    active.remove(&job_id);
                }
                Err(e) => tracing::error!("RwLock poisoned removing active job: {e}"),
            }
            if let Some(cleanup) = cleanup {
                cleanup(job_id);
            }

            tokio::time::sleep(service.retention).await;
            if service.store.evict(&job_id) {
                tracing::debug!(job_id = %job_id, "Evicted finished job");
            }
        });

        job_id
    }

    /// Attach `handle` as the job's subscriber.
    ///
    /// A running job gets its current snapshot pushed before the handle is
    /// bound. A finished job gets its terminal snapshot and the handle is
    /// closed without binding.
    pub fn subscribe(
        &self,
        job_id: JobId,
        handle: SubscriberHandle,
    ) -> Result<SubscribeOutcome, JobError> {
        match self.store.get(&job_id) {
            Some(progress) if progress.is_terminal() => {
                return Ok(deliver_terminal(&handle, progress));
            }
            Some(progress) => {
                if handle.push(progress).is_err() {
                    tracing::debug!(job_id = %job_id, "Subscriber gone before binding");
                }
            }
            None if !self.is_active(&job_id) => {
                // The job may have finished between the two reads.
                return match self.store.get(&job_id) {
                    Some(progress) if progress.is_terminal() => Ok(deliver_terminal(&handle, progress)),
                    _ => Err(JobError::NotFound(job_id)),
                };
            }
            None => {}
        }

        if let Some(previous) = self.registry.bind(job_id, handle.clone()) {
            if previous.id() != handle.id() {
                tracing::debug!(job_id = %job_id, displaced = previous.id(), "Subscriber displaced");
                previous.close(SUPERSEDED_REASON);
            }
        }

        // The runner may have written its terminal state while we were
        // binding. Whoever removes the binding delivers the terminal snapshot.
        if let Some(progress) = self.store.get(&job_id).filter(JobProgress::is_terminal) {
            if self.registry.release(&job_id, handle.id()).is_some() {
                return Ok(deliver_terminal(&handle, progress));
            }
        }

        tracing::debug!(job_id = %job_id, handle = handle.id(), "Subscriber bound");
        Ok(SubscribeOutcome::Bound)
    }

    /// Detach a subscriber after a transport disconnect. No-op if the
    /// binding already belongs to a different handle.
    pub fn unsubscribe(&self, job_id: &JobId, handle_id: u64) -> bool {
        self.registry.release(job_id, handle_id).is_some()
    }

    pub fn poll(&self, job_id: &JobId) -> Result<JobProgress, JobError> {
        self.store.get(job_id).ok_or(JobError::NotFound(*job_id))
    }

    /// Request cancellation. The runner stops at its next chunk boundary.
    pub fn cancel(&self, job_id: &JobId) -> Result<(), JobError> {
        let token = match self.active.read() {
            Ok(active) => active.get(job_id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading active jobs: {e}");
                None
            }
        };
        let token = token.ok_or(JobError::NotFound(*job_id))?;
        token.cancel();
        tracing::info!(job_id = %job_id, "Job cancellation requested");
        Ok(())
    }

    pub fn is_active(&self, job_id: &JobId) -> bool {
        match self.active.read() {
            Ok(active) => active.contains_key(job_id),
            Err(e) => {
                tracing::error!("RwLock poisoned reading active jobs: {e}");
                false
            }
        }
    }

    /// Running, or finished and not yet evicted.
    pub fn exists(&self, job_id: &JobId) -> bool {
        self.is_active(job_id) || self.store.get(job_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        match self.active.read() {
            Ok(active) => active.len(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading active jobs: {e}");
                0
            }
        }
    }
}

fn deliver_terminal(handle: &SubscriberHandle, progress: JobProgress) -> SubscribeOutcome {
    let reason = close_reason(progress.status);
    if handle.push(progress).is_err() {
        metrics::record_push_failure();
    }
    handle.close(reason);
    SubscribeOutcome::Delivered
}
