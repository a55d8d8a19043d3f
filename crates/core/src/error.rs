// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while classifying a single prepared item.
///
/// Every variant is item-scoped: the batch runner records it as that item's
/// `Failed` result and moves on. `Unavailable` is additionally what a backend
/// reports from its health check when a whole batch cannot start.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model server request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Model server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Model predicted index {0}, which is not in the taxonomy")]
    UnknownClass(usize),

    #[error("Classification backend unavailable: {0}")]
    Unavailable(String),
}

impl ClassifyError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the backend itself could not be reached, as opposed to the
    /// item being unclassifiable.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Request(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Errors that can occur when loading a taxonomy file.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("IO error reading taxonomy {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid taxonomy TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Taxonomy defines no classes")]
    Empty,

    #[error("Duplicate class {field} in taxonomy: {value}")]
    Duplicate { field: &'static str, value: String },

    #[error("Group bucket {bucket} references unknown class {class}")]
    UnknownGroupClass { bucket: String, class: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_unavailable() {
        let err = ClassifyError::Unavailable("connection refused".into());
        assert!(err.is_unavailable());
        assert_eq!(
            err.to_string(),
            "Classification backend unavailable: connection refused"
        );
    }

    #[test]
    fn test_item_errors_are_not_unavailable() {
        assert!(!ClassifyError::UnknownClass(42).is_unavailable());
        assert!(!ClassifyError::MalformedResponse("no predictions".into()).is_unavailable());
        assert!(!ClassifyError::Status {
            status: 400,
            body: "bad image".into()
        }
        .is_unavailable());
    }

    #[test]
    fn test_io_constructor_keeps_path() {
        let err = ClassifyError::io(
            "/tmp/job/a.jpg",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/job/a.jpg"));
    }
}
