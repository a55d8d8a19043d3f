// crates/server/src/jobs/registry.rs
//! Job ID -> subscriber binding. At most one live subscriber per job.

use dashmap::DashMap;
use ecosort_core::JobId;

use super::types::SubscriberHandle;

pub trait SubscriberRegistry: Send + Sync {
    /// Bind `handle` to `job_id`, replacing any existing binding.
    /// Returns the displaced handle so the caller can close it.
    fn bind(&self, job_id: JobId, handle: SubscriberHandle) -> Option<SubscriberHandle>;

    fn lookup(&self, job_id: &JobId) -> Option<SubscriberHandle>;

    /// Remove whatever is bound to `job_id`.
    fn unbind(&self, job_id: &JobId) -> Option<SubscriberHandle>;

    /// Remove the binding only if it still belongs to `handle_id`.
    /// A stale handle can never drop its successor.
    fn release(&self, job_id: &JobId, handle_id: u64) -> Option<SubscriberHandle>;
}

#[derive(Default)]
pub struct InMemorySubscriberRegistry {
    bindings: DashMap<JobId, SubscriberHandle>,
}

impl InMemorySubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl SubscriberRegistry for InMemorySubscriberRegistry {
    fn bind(&self, job_id: JobId, handle: SubscriberHandle) -> Option<SubscriberHandle> {
        self.bindings.insert(job_id, handle)
    }

    fn lookup(&self, job_id: &JobId) -> Option<SubscriberHandle> {
        self.bindings.get(job_id).map(|entry| entry.value().clone())
    }

    fn unbind(&self, job_id: &JobId) -> Option<SubscriberHandle> {
        self.bindings.remove(job_id).map(|(_, handle)| handle)
    }

    fn release(&self, job_id: &JobId, handle_id: u64) -> Option<SubscriberHandle> {
        self.bindings
            .remove_if(job_id, |_, handle| handle.id() == handle_id)
            .map(|(_, handle)| handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_lookup() {
        let registry = InMemorySubscriberRegistry::new();
        let job = JobId::new();
        let (handle, _rx) = SubscriberHandle::channel();

        assert!(registry.lookup(&job).is_none());
        assert!(registry.bind(job, handle.clone()).is_none());
        assert_eq!(registry.lookup(&job).unwrap().id(), handle.id());
    }

    #[test]
    fn test_rebind_returns_displaced_handle() {
        let registry = InMemorySubscriberRegistry::new();
        let job = JobId::new();
        let (first, _rx1) = SubscriberHandle::channel();
        let (second, _rx2) = SubscriberHandle::channel();

        registry.bind(job, first.clone());
        let displaced = registry.bind(job, second.clone()).unwrap();
        assert_eq!(displaced.id(), first.id());
        assert_eq!(registry.lookup(&job).unwrap().id(), second.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let registry = InMemorySubscriberRegistry::new();
        let job = JobId::new();
        let (handle, _rx) = SubscriberHandle::channel();
        registry.bind(job, handle);

        assert!(registry.unbind(&job).is_some());
        assert!(registry.unbind(&job).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_ignores_stale_handle() {
        let registry = InMemorySubscriberRegistry::new();
        let job = JobId::new();
        let (old, _rx1) = SubscriberHandle::channel();
        let (new, _rx2) = SubscriberHandle::channel();
        registry.bind(job, old.clone());
        registry.bind(job, new.clone());

        assert!(registry.release(&job, old.id()).is_none());
        assert_eq!(registry.lookup(&job).unwrap().id(), new.id());

        assert_eq!(registry.release(&job, new.id()).unwrap().id(), new.id());
        assert!(registry.lookup(&job).is_none());
    }

    #[test]
    fn test_bindings_are_per_job() {
        let registry = InMemorySubscriberRegistry::new();
        let a = JobId::new();
        let b = JobId::new();
        let (ha, _rxa) = SubscriberHandle::channel();
        let (hb, _rxb) = SubscriberHandle::channel();
        registry.bind(a, ha.clone());
        registry.bind(b, hb.clone());

        registry.unbind(&a);
        assert!(registry.lookup(&a).is_none());
        assert_eq!(registry.lookup(&b).unwrap().id(), hb.id());
    }
}
