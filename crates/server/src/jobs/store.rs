// crates/server/src/jobs/store.rs
//! Authoritative job progress store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use ecosort_core::{JobId, JobProgress, ProgressUpdate};

/// Concurrency-safe mapping from job ID to its current progress.
///
/// Readers never observe a partially applied update: `upsert` swaps the
/// whole record under the write lock.
pub trait JobStore: Send + Sync {
    fn get(&self, job_id: &JobId) -> Option<JobProgress>;

    /// Create the record from `update`, or merge into the existing one
    /// (results appended, percent and status replaced). Returns the record
    /// as written.
    fn upsert(&self, job_id: JobId, update: ProgressUpdate) -> JobProgress;

    /// Remove the record permanently. Returns true if it existed.
    fn evict(&self, job_id: &JobId) -> bool;
}

/// Process-local store backed by a readers-writer lock.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobProgress>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for InMemoryJobStore {
    fn get(&self, job_id: &JobId) -> Option<JobProgress> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(job_id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading job store: {e}");
                e.into_inner().get(job_id).cloned()
            }
        }
    }

    fn upsert(&self, job_id: JobId, update: ProgressUpdate) -> JobProgress {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned writing job store: {e}");
            e.into_inner()
        });
        match jobs.get_mut(&job_id) {
            Some(existing) => {
                existing.merge(update);
                existing.clone()
            }
            None => {
                let created = JobProgress::from_update(job_id, update);
                jobs.insert(job_id, created.clone());
                created
            }
        }
    }

    fn evict(&self, job_id: &JobId) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| {
            tracing::error!("RwLock poisoned evicting from job store: {e}");
            e.into_inner()
        });
        jobs.remove(job_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosort_core::{ItemResult, JobStatus};
    use std::sync::Arc;

    #[test]
    fn test_get_unknown_is_none() {
        let store = InMemoryJobStore::new();
        assert!(store.get(&JobId::new()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_creates_then_merges() {
        let store = InMemoryJobStore::new();
        let id = JobId::new();

        let first = store.upsert(
            id,
            ProgressUpdate::running(40, vec![ItemResult::completed("a.jpg", "paper")]),
        );
        assert_eq!(first.progress_percent, 40);
        assert_eq!(first.results.len(), 1);

        let second = store.upsert(
            id,
            ProgressUpdate::running(80, vec![ItemResult::failed("b.jpg", "bad bytes")]),
        );
        assert_eq!(second.progress_percent, 80);
        assert_eq!(second.results.len(), 2);
        assert_eq!(second.results[0].item_name, "a.jpg");
        assert_eq!(second.results[1].item_name, "b.jpg");

        let terminal = store.upsert(id, ProgressUpdate::finished(JobStatus::Completed, Vec::new()));
        assert_eq!(terminal.status, JobStatus::Completed);
        assert_eq!(terminal.results.len(), 2);
        assert_eq!(store.get(&id).unwrap(), terminal);
    }

    #[test]
    fn test_evict_removes_permanently() {
        let store = InMemoryJobStore::new();
        let id = JobId::new();
        store.upsert(id, ProgressUpdate::finished(JobStatus::Completed, Vec::new()));

        assert!(store.evict(&id));
        assert!(store.get(&id).is_none());
        assert!(!store.evict(&id));
    }

    #[test]
    fn test_jobs_are_isolated() {
        let store = InMemoryJobStore::new();
        let a = JobId::new();
        let b = JobId::new();
        store.upsert(a, ProgressUpdate::running(50, vec![ItemResult::completed("a.jpg", "metal")]));
        store.upsert(b, ProgressUpdate::running(10, Vec::new()));

        assert_eq!(store.get(&a).unwrap().results.len(), 1);
        assert!(store.get(&b).unwrap().results.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_readers_see_whole_updates() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = JobId::new();
        store.upsert(id, ProgressUpdate::running(0, Vec::new()));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 1..=100u8 {
                    store.upsert(
                        id,
                        ProgressUpdate::running(i, vec![ItemResult::completed(format!("{i}.jpg"), "paper")]),
                    );
                }
            })
        };

        // Every update adds one result and one percent, so a torn write
        // would show the two out of step.
        let mut last = 0;
        while last < 100 {
            let snap = store.get(&id).unwrap();
            assert_eq!(snap.results.len(), snap.progress_percent as usize);
            assert!(snap.progress_percent >= last);
            last = snap.progress_percent;
        }
        writer.join().unwrap();
    }
}
