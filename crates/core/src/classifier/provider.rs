// crates/core/src/classifier/provider.rs
//! Classifier trait defining the interface for classification backends.

use async_trait::async_trait;

use crate::error::ClassifyError;
use crate::item::PreparedItem;
use crate::taxonomy::ClassLabel;

/// Trait for backends that can label one prepared item.
///
/// Implementations must return only item-scoped errors from `classify`.
/// A backend that cannot serve at all should say so from `health_check`,
/// which the batch runner calls once before a job's first chunk.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, item: &PreparedItem) -> Result<ClassLabel, ClassifyError>;

    async fn health_check(&self) -> Result<(), ClassifyError> {
        Ok(())
    }

    /// Backend name for logging (e.g. "tf-serving").
    fn name(&self) -> &str;
}

#[async_trait]
impl<C: Classifier + ?Sized> Classifier for std::sync::Arc<C> {
    async fn classify(&self, item: &PreparedItem) -> Result<ClassLabel, ClassifyError> {
        (**self).classify(item).await
    }

    async fn health_check(&self) -> Result<(), ClassifyError> {
        (**self).health_check().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
