// crates/server/src/jobs/types.rs
//! Types shared by the job store, subscriber registry, runner and facade.

use std::sync::atomic::{AtomicU64, Ordering};

use ecosort_core::{JobId, JobProgress, PreparedItem};
use thiserror::Error;
use tokio::sync::mpsc;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Message delivered to a subscriber's transport.
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    Progress(JobProgress),
    /// End of stream. The transport should close the connection.
    Close { reason: String },
}

/// A push failed because the receiving side is gone.
#[derive(Debug, Error)]
#[error("Subscriber {handle_id} is no longer receiving")]
pub struct DeliveryError {
    pub handle_id: u64,
}

/// Sending half of a subscriber's push channel.
///
/// The transport owns the receiving half and the physical connection; the
/// registry only holds this handle. Dropping the receiver makes every later
/// push fail with `DeliveryError`.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: u64,
    tx: mpsc::UnboundedSender<PushMessage>,
}

impl SubscriberHandle {
    /// Create a handle plus the receiver the transport drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PushMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn push(&self, progress: JobProgress) -> Result<(), DeliveryError> {
        self.tx
            .send(PushMessage::Progress(progress))
            .map_err(|_| DeliveryError { handle_id: self.id })
    }

    /// Signal end of stream. Best effort: a gone receiver is ignored.
    pub fn close(&self, reason: impl Into<String>) {
        let _ = self.tx.send(PushMessage::Close {
            reason: reason.into(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Callback the upload layer registers to release per-job working storage.
pub type CleanupHook = Box<dyn FnOnce(JobId) + Send + 'static>;

/// Everything needed to start a batch job.
pub struct JobRequest {
    pub items: Vec<PreparedItem>,
    pub cleanup: Option<CleanupHook>,
}

impl JobRequest {
    pub fn new(items: Vec<PreparedItem>) -> Self {
        Self {
            items,
            cleanup: None,
        }
    }

    pub fn with_cleanup(mut self, cleanup: impl FnOnce(JobId) + Send + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

impl std::fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRequest")
            .field("items", &self.items.len())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Facade-level failures surfaced to the transport.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    /// Unknown, evicted, or (for cancel) already finished.
    #[error("Job not found: {0}")]
    NotFound(JobId),
}

/// What `JobService::subscribe` did with the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Bound as the job's sole subscriber; pushes follow.
    Bound,
    /// The job had already finished: the terminal snapshot was delivered and
    /// the handle closed without binding.
    Delivered,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosort_core::{ProgressUpdate, ItemResult};

    fn snapshot() -> JobProgress {
        JobProgress::from_update(
            JobId::new(),
            ProgressUpdate::running(10, vec![ItemResult::completed("a.jpg", "paper")]),
        )
    }

    #[test]
    fn test_handle_ids_are_unique() {
        let (a, _rx_a) = SubscriberHandle::channel();
        let (b, _rx_b) = SubscriberHandle::channel();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_push_and_close_reach_receiver() {
        let (handle, mut rx) = SubscriberHandle::channel();
        let progress = snapshot();
        handle.push(progress.clone()).unwrap();
        handle.close("done");

        assert_eq!(rx.try_recv().unwrap(), PushMessage::Progress(progress));
        assert_eq!(
            rx.try_recv().unwrap(),
            PushMessage::Close {
                reason: "done".into()
            }
        );
    }

    #[test]
    fn test_push_to_dropped_receiver_fails() {
        let (handle, rx) = SubscriberHandle::channel();
        drop(rx);
        assert!(handle.is_closed());
        let err = handle.push(snapshot()).unwrap_err();
        assert_eq!(err.handle_id, handle.id());
        // close on a dead channel is a no-op
        handle.close("ignored");
    }

    #[test]
    fn test_job_request_cleanup_runs_once() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let request = JobRequest::new(Vec::new()).with_cleanup(move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        let cleanup = request.cleanup.unwrap();
        cleanup(JobId::new());
        assert!(ran.load(Ordering::SeqCst));
    }
}
