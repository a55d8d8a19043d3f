// crates/server/src/upload.rs
//! Upload validation and per-job working storage.

use std::path::{Path, PathBuf};

use ecosort_core::PreparedItem;
use tempfile::TempDir;
use thiserror::Error;

use crate::jobs::JobRequest;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "video/mp4",
    "video/x-msvideo",
    "video/mpeg",
];

/// Leading bytes inspected when sniffing content.
const SNIFF_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No files were uploaded")]
    NoFiles,

    #[error("File '{name}' is empty")]
    Empty { name: String },

    #[error("File '{name}' is too large: {size} bytes (limit {limit})")]
    TooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    #[error("File '{name}' has unsupported type {mime}")]
    UnsupportedType { name: String, mime: String },

    #[error("Upload storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Identify a media type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    match head {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'A', b'V', b'I', b' ', ..] => Some("video/x-msvideo"),
        [0x00, 0x00, 0x01, 0xBA | 0xB3, ..] => Some("video/mpeg"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some("video/mp4"),
        _ => None,
    }
}

/// Sniffed type, or the type implied by the file extension when the bytes
/// are not recognised.
pub fn detect_mime(file_name: &str, bytes: &[u8]) -> Option<&'static str> {
    sniff_mime(bytes).or_else(|| {
        mime_guess::from_path(file_name)
            .iter_raw()
            .find(|mime| ALLOWED_MIME_TYPES.contains(mime))
            .or_else(|| mime_guess::from_path(file_name).first_raw())
    })
}

/// Strip any client-supplied directories and make sure the name ends in
/// `.jpg`, which the model server expects.
pub fn normalized_name(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("upload");
    if base.ends_with(".jpg") {
        base.to_string()
    } else {
        format!("{base}.jpg")
    }
}

/// Type and size policy for a single uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_file_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: 50 << 20,
        }
    }
}

impl UploadPolicy {
    /// Validate a file and return its detected media type.
    pub fn validate(&self, file_name: &str, bytes: &[u8]) -> Result<&'static str, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty {
                name: file_name.to_string(),
            });
        }
        if bytes.len() > self.max_file_bytes {
            return Err(UploadError::TooLarge {
                name: file_name.to_string(),
                size: bytes.len(),
                limit: self.max_file_bytes,
            });
        }
        match detect_mime(file_name, bytes) {
            Some(mime) if ALLOWED_MIME_TYPES.contains(&mime) => Ok(mime),
            other => Err(UploadError::UnsupportedType {
                name: file_name.to_string(),
                mime: other.unwrap_or("application/octet-stream").to_string(),
            }),
        }
    }
}

/// Job-scoped directory holding the accepted uploads in arrival order.
/// Removed when dropped, or by the job's cleanup hook once it finishes.
pub struct JobWorkspace {
    dir: TempDir,
    items: Vec<PreparedItem>,
}

impl JobWorkspace {
    pub async fn create(root: &Path) -> Result<Self, UploadError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| UploadError::storage(root, e))?;
        let dir = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(root)
            .map_err(|e| UploadError::storage(root, e))?;
        Ok(Self {
            dir,
            items: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[PreparedItem] {
        &self.items
    }

    /// Write one validated file. The on-disk name is prefixed with its
    /// position so duplicate client names cannot collide.
    pub async fn persist(&mut self, name: &str, bytes: &[u8]) -> Result<&PreparedItem, UploadError> {
        let path = self.dir.path().join(format!("{:04}-{name}", self.items.len()));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| UploadError::storage(&path, e))?;
        self.items.push(PreparedItem::new(name, path));
        Ok(&self.items[self.items.len() - 1])
    }

    /// Hand the items to the job engine. The directory lives until the job
    /// reports completion through the cleanup hook.
    pub fn into_request(self) -> JobRequest {
        let Self { dir, items } = self;
        JobRequest::new(items).with_cleanup(move |job_id| {
            tokio::task::spawn_blocking(move || {
                let path = dir.path().to_path_buf();
                match dir.close() {
                    Ok(()) => tracing::debug!(job_id = %job_id, path = %path.display(), "Removed job workspace"),
                    Err(e) => tracing::warn!(job_id = %job_id, path = %path.display(), error = %e, "Failed to remove job workspace"),
                }
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosort_core::JobId;

    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00";
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    #[test]
    fn test_sniff_magic_bytes() {
        assert_eq!(sniff_mime(JPEG), Some("image/jpeg"));
        assert_eq!(sniff_mime(PNG), Some("image/png"));
        assert_eq!(sniff_mime(b"GIF89a\x01\x00"), Some("image/gif"));
        assert_eq!(sniff_mime(b"GIF87a\x01\x00"), Some("image/gif"));
        assert_eq!(sniff_mime(b"\x00\x00\x00\x18ftypmp42"), Some("video/mp4"));
        assert_eq!(sniff_mime(b"RIFF\x00\x00\x00\x00AVI LIST"), Some("video/x-msvideo"));
        assert_eq!(sniff_mime(b"\x00\x00\x01\xBA\x44"), Some("video/mpeg"));
        assert_eq!(sniff_mime(b"hello world"), None);
        assert_eq!(sniff_mime(b""), None);
    }

    #[test]
    fn test_detect_falls_back_to_extension() {
        assert_eq!(detect_mime("clip.mp4", b"opaque"), Some("video/mp4"));
        assert_eq!(detect_mime("photo.jpeg", b"opaque"), Some("image/jpeg"));
        assert_eq!(detect_mime("notes.txt", b"opaque"), Some("text/plain"));
        assert_eq!(detect_mime("noext", b"opaque"), None);
        // Content wins over a misleading extension.
        assert_eq!(detect_mime("photo.gif", PNG), Some("image/png"));
    }

    #[test]
    fn test_normalized_name() {
        assert_eq!(normalized_name("a.jpg"), "a.jpg");
        assert_eq!(normalized_name("b.png"), "b.png.jpg");
        assert_eq!(normalized_name("C.JPG"), "C.JPG.jpg");
        assert_eq!(normalized_name("../../etc/passwd"), "passwd.jpg");
        assert_eq!(normalized_name("C:\\photos\\bin.jpg"), "bin.jpg");
        assert_eq!(normalized_name("dir/"), "upload.jpg");
    }

    #[test]
    fn test_policy_accepts_allowed_types() {
        let policy = UploadPolicy::default();
        assert_eq!(policy.validate("a.jpg", JPEG).unwrap(), "image/jpeg");
        assert_eq!(policy.validate("clip.avi", b"opaque").unwrap(), "video/x-msvideo");
    }

    #[test]
    fn test_policy_rejects() {
        let policy = UploadPolicy { max_file_bytes: 8 };
        assert!(matches!(policy.validate("a.jpg", b""), Err(UploadError::Empty { .. })));
        assert!(matches!(
            policy.validate("a.jpg", JPEG),
            Err(UploadError::TooLarge { limit: 8, .. })
        ));
        let err = policy.validate("a.txt", b"text").unwrap_err();
        match err {
            UploadError::UnsupportedType { mime, .. } => assert_eq!(mime, "text/plain"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            policy.validate("blob", b"\x01\x02"),
            Err(UploadError::UnsupportedType { .. })
        ));
    }

    #[tokio::test]
    async fn test_workspace_persists_in_order() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = JobWorkspace::create(root.path()).await.unwrap();
        workspace.persist("a.jpg", JPEG).await.unwrap();
        workspace.persist("a.jpg", PNG).await.unwrap();

        assert_eq!(workspace.len(), 2);
        let items = workspace.items();
        assert_eq!(items[0].name(), "a.jpg");
        assert_ne!(items[0].path(), items[1].path());
        assert_eq!(items[1].read_bytes().await.unwrap(), PNG);
        assert!(workspace.path().starts_with(root.path()));
    }

    #[tokio::test]
    async fn test_cleanup_hook_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = JobWorkspace::create(root.path()).await.unwrap();
        workspace.persist("a.jpg", JPEG).await.unwrap();
        let dir = workspace.path().to_path_buf();

        let request = workspace.into_request();
        assert_eq!(request.items.len(), 1);
        assert!(dir.exists());

        (request.cleanup.unwrap())(JobId::new());
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while dir.exists() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
