// crates/core/src/progress.rs
//! Job progress data model.
//!
//! `JobProgress` is the single unit of truth for a batch job. Writers never
//! resend history: they submit a `ProgressUpdate` carrying only the results
//! of the chunk just finished, and `JobProgress::merge` appends them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "codegen")]
use ts_rs::TS;
use uuid::Uuid;

/// Opaque identifier of a batch job. Generated once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../bindings/"))]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Outcome of classifying one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../bindings/"))]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Completed,
    Failed,
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../bindings/"))]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    /// Cancelled before every chunk ran; unprocessed items are marked failed.
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
        }
    }
}

/// Result for a single input item. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../bindings/"))]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub item_name: String,
    /// Class name assigned by the backend; `None` when classification failed.
    pub label: Option<String>,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    pub fn completed(item_name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            label: Some(label.into()),
            status: ItemStatus::Completed,
            error: None,
        }
    }

    pub fn failed(item_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            label: None,
            status: ItemStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Partial update written by the batch runner after each chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub progress_percent: u8,
    pub status: JobStatus,
    /// Results produced since the previous update only.
    pub results: Vec<ItemResult>,
}

impl ProgressUpdate {
    pub fn running(progress_percent: u8, results: Vec<ItemResult>) -> Self {
        Self {
            progress_percent,
            status: JobStatus::Running,
            results,
        }
    }

    /// Terminal update. Terminal states always report 100%.
    pub fn finished(status: JobStatus, results: Vec<ItemResult>) -> Self {
        debug_assert!(status.is_terminal());
        Self {
            progress_percent: 100,
            status,
            results,
        }
    }
}

/// Authoritative progress state of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "codegen", derive(TS), ts(export, export_to = "../../bindings/"))]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: JobId,
    pub progress_percent: u8,
    pub status: JobStatus,
    pub results: Vec<ItemResult>,
    pub updated_at: DateTime<Utc>,
}

impl JobProgress {
    /// Build the first record for a job from its first update.
    pub fn from_update(job_id: JobId, update: ProgressUpdate) -> Self {
        Self {
            job_id,
            progress_percent: update.progress_percent,
            status: update.status,
            results: update.results,
            updated_at: Utc::now(),
        }
    }

    /// Apply an update: results are appended, percent and status replaced.
    pub fn merge(&mut self, update: ProgressUpdate) {
        debug_assert!(
            update.progress_percent >= self.progress_percent,
            "progress must not go backwards ({} -> {})",
            self.progress_percent,
            update.progress_percent
        );
        self.progress_percent = update.progress_percent;
        self.status = update.status;
        self.results.extend(update.results);
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// `floor(processed * 100 / total)`, or 100 for an empty job.
pub fn percent_complete(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let processed = processed.min(total) as u64;
    (processed * 100 / total as u64) as u8
}
