// crates/core/src/classifier/gate.rs
//! Mutual-exclusion gate for backends that hold a single loaded model.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::provider::Classifier;
use crate::error::ClassifyError;
use crate::item::PreparedItem;
use crate::taxonomy::ClassLabel;

/// Wraps a classifier so that at most one `classify` call runs at a time,
/// across every job sharing this instance.
///
/// Health checks bypass the gate: they must not queue behind inference.
pub struct SerializedClassifier<C> {
    inner: C,
    gate: Mutex<()>,
}

impl<C: Classifier> SerializedClassifier<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C: Classifier> Classifier for SerializedClassifier<C> {
    async fn classify(&self, item: &PreparedItem) -> Result<ClassLabel, ClassifyError> {
        let _permit = self.gate.lock().await;
        self.inner.classify(item).await
    }

    async fn health_check(&self) -> Result<(), ClassifyError> {
        self.inner.health_check().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
