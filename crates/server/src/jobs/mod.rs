// crates/server/src/jobs/mod.rs
//! Batch job engine.
//!
//! Provides:
//! - `JobStore`: authoritative progress per job
//! - `SubscriberRegistry`: at most one push channel per job
//! - `BatchRunner`: chunked execution against a classifier
//! - `JobService`: facade used by the HTTP/WebSocket layer

pub mod registry;
pub mod runner;
pub mod service;
pub mod store;
pub mod types;

pub use registry::{InMemorySubscriberRegistry, SubscriberRegistry};
pub use runner::{BatchRunner, RunnerConfig};
pub use service::JobService;
pub use store::{InMemoryJobStore, JobStore};
pub use types::{
    DeliveryError, JobError, JobRequest, PushMessage, SubscribeOutcome, SubscriberHandle,
};
