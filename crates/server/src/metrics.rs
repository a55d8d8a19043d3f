//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric definitions for the batch job engine and HTTP surface
//! - Helper functions for recording metrics

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use ecosort_core::{ItemStatus, JobStatus};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    // Request metrics
    describe_counter!("ecosort_requests_total", "Total number of API requests");
    describe_histogram!(
        "ecosort_request_duration_seconds",
        "Duration of API requests in seconds"
    );

    // Job engine metrics
    describe_counter!("ecosort_jobs_created_total", "Batch jobs accepted");
    describe_counter!(
        "ecosort_jobs_finished_total",
        "Batch jobs that reached a terminal status"
    );
    describe_gauge!("ecosort_jobs_active", "Batch jobs currently running");
    describe_counter!(
        "ecosort_job_items_total",
        "Items processed by batch jobs, by outcome"
    );
    describe_histogram!(
        "ecosort_job_duration_seconds",
        "Wall-clock duration of batch jobs in seconds"
    );
    describe_counter!(
        "ecosort_subscriber_push_failures_total",
        "Progress pushes that could not be delivered to a subscriber"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Record a completed API request.
pub fn record_request(endpoint: &str, status: &str, duration: Duration) {
    counter!("ecosort_requests_total", "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("ecosort_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_job_created(total_items: usize) {
    counter!("ecosort_jobs_created_total").increment(1);
    tracing::debug!(total_items, "Batch job accepted");
}

/// Record a job reaching its terminal status.
pub fn record_job_finished(status: JobStatus, duration: Duration) {
    counter!("ecosort_jobs_finished_total", "status" => status.as_str()).increment(1);
    histogram!("ecosort_job_duration_seconds", "status" => status.as_str())
        .record(duration.as_secs_f64());
}

/// Set the running-jobs gauge from the job engine's own count.
pub fn set_active_jobs(count: usize) {
    gauge!("ecosort_jobs_active").set(count as f64);
}

pub fn record_item(status: ItemStatus) {
    let label = match status {
        ItemStatus::Completed => "completed",
        ItemStatus::Failed => "failed",
    };
    counter!("ecosort_job_items_total", "status" => label).increment(1);
}

pub fn record_push_failure() {
    counter!("ecosort_subscriber_push_failures_total").increment(1);
}

/// Helper for timing request handlers.
///
/// ```ignore
/// let timer = RequestTimer::new("predict_batch");
/// // ... do work ...
/// timer.finish("202");
/// ```
pub struct RequestTimer {
    endpoint: &'static str,
    start: Instant,
}

impl RequestTimer {
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start: Instant::now(),
        }
    }

    pub fn finish(self, status: &str) {
        record_request(self.endpoint, status, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_idempotent() {
        // First call may succeed or fail depending on test order
        let _ = init_metrics();
        // Second call should always return false (already initialized)
        assert!(!init_metrics());
        assert!(render_metrics().is_some());
    }

    #[test]
    fn test_recorders_do_not_panic_without_init() {
        // Without an installed recorder these are no-ops.
        record_item(ItemStatus::Completed);
        record_push_failure();
        record_job_created(3);
        record_job_finished(JobStatus::Stopped, Duration::from_millis(5));
        RequestTimer::new("test").finish("200");
    }
}
