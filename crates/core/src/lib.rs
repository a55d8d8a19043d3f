// crates/core/src/lib.rs
//! Domain types and classification backends for ecosort.

pub mod classifier;
pub mod error;
pub mod item;
pub mod progress;
pub mod taxonomy;

pub use classifier::{Classifier, HttpModelClassifier, SerializedClassifier};
pub use error::*;
pub use item::PreparedItem;
pub use progress::*;
pub use taxonomy::{ClassGroup, ClassLabel, GroupConfig, ModelInfo, Taxonomy};
