// crates/core/src/item.rs
use std::path::{Path, PathBuf};

use crate::error::ClassifyError;

/// An uploaded item that already passed type/size validation and was
/// persisted by the upload layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedItem {
    name: String,
    path: PathBuf,
}

impl PreparedItem {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Stable display name reported back in `ItemResult::item_name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read_bytes(&self) -> Result<Vec<u8>, ClassifyError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| ClassifyError::io(&self.path, e))
    }
}
