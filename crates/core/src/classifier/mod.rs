// crates/core/src/classifier/mod.rs
//! Classification backend integration.
//!
//! Provides the `Classifier` trait, a gate that serializes calls into a
//! non-reentrant backend, and an HTTP backend for a TensorFlow Serving
//! style model server.

pub mod gate;
pub mod http;
pub mod provider;

pub use gate::SerializedClassifier;
pub use http::HttpModelClassifier;
pub use provider::Classifier;
