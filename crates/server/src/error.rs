// crates/server/src/error.rs
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ecosort_core::{ClassifyError, JobId};
use serde::Serialize;
use thiserror::Error;

use crate::jobs::JobError;
use crate::upload::UploadError;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Upload rejected: {0}")]
    Upload(#[from] UploadError),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Classification failed: {0}")]
    Classification(#[from] ClassifyError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => Self::JobNotFound(id),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {id}")),
                )
            }
            ApiError::Upload(upload_err) => {
                // Client-caused rejections echo the reason; storage failures
                // stay in the log.
                match upload_err {
                    UploadError::NoFiles | UploadError::Empty { .. } => {
                        tracing::warn!(error = %upload_err, "Invalid upload");
                        (
                            StatusCode::BAD_REQUEST,
                            ErrorResponse::with_details("Invalid upload", upload_err.to_string()),
                        )
                    }
                    UploadError::TooLarge { name, size, .. } => {
                        tracing::warn!(file = %name, size, "Upload too large");
                        (
                            StatusCode::PAYLOAD_TOO_LARGE,
                            ErrorResponse::with_details("File too large", upload_err.to_string()),
                        )
                    }
                    UploadError::UnsupportedType { name, mime } => {
                        tracing::warn!(file = %name, mime = %mime, "Unsupported file type");
                        (
                            StatusCode::UNSUPPORTED_MEDIA_TYPE,
                            ErrorResponse::with_details("Unsupported file type", upload_err.to_string()),
                        )
                    }
                    UploadError::Storage { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "Upload storage error");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            ErrorResponse::new("Failed to store upload"),
                        )
                    }
                }
            }
            ApiError::Multipart(multipart_err) => {
                tracing::warn!(error = %multipart_err, "Malformed multipart body");
                (
                    multipart_err.status(),
                    ErrorResponse::with_details("Malformed upload", multipart_err.body_text()),
                )
            }
            ApiError::Classification(classify_err) => {
                tracing::error!(error = %classify_err, "Classification backend error");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::with_details(
                        "Classification failed",
                        "The model server could not classify this file",
                    ),
                )
            }
            ApiError::Unauthorized => {
                tracing::warn!("Rejected request with missing or invalid API key");
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::new("Unauthorized"),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::path::PathBuf;

    /// Helper to extract status code and body from a response
    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_job_not_found_returns_404() {
        let id = JobId::new();
        let (status, body) = extract_response(ApiError::from(JobError::NotFound(id)).into_response()).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Job not found");
        assert!(body.details.unwrap().contains(&id.to_string()));
    }

    #[tokio::test]
    async fn test_upload_errors_map_to_status() {
        let cases = [
            (UploadError::NoFiles, StatusCode::BAD_REQUEST),
            (UploadError::Empty { name: "a.jpg".into() }, StatusCode::BAD_REQUEST),
            (
                UploadError::TooLarge {
                    name: "a.jpg".into(),
                    size: 100,
                    limit: 10,
                },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                UploadError::UnsupportedType {
                    name: "a.txt".into(),
                    mime: "text/plain".into(),
                },
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
        ];

        for (err, expected) in cases {
            let (status, body) = extract_response(ApiError::from(err).into_response()).await;
            assert_eq!(status, expected);
            assert!(body.details.is_some());
        }
    }

    #[tokio::test]
    async fn test_storage_error_hides_upload_path() {
        let err = UploadError::Storage {
            path: PathBuf::from("/srv/uploads/job-abc/0000-a.jpg"),
            source: std::io::Error::other("disk full"),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text, r#"{"error":"Failed to store upload"}"#);
    }

    #[tokio::test]
    async fn test_classification_error_returns_502() {
        let err = ClassifyError::Status {
            status: 500,
            body: "oom".into(),
        };
        let (status, body) = extract_response(ApiError::from(err).into_response()).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error, "Classification failed");
        assert!(!body.details.unwrap().contains("oom"));
    }

    #[tokio::test]
    async fn test_classification_error_hides_backend_details() {
        let cases = [
            ClassifyError::Unavailable("http://10.0.0.7:8501/v1/models/ecosort unreachable".into()),
            ClassifyError::io("/srv/uploads/job-abc/0000-a.jpg", std::io::Error::other("gone")),
        ];

        for err in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let text = String::from_utf8(body.to_vec()).unwrap();
            assert!(!text.contains("10.0.0.7"), "{text}");
            assert!(!text.contains("/srv/uploads"), "{text}");
        }
    }

    #[tokio::test]
    async fn test_unauthorized_returns_401() {
        let (status, body) = extract_response(ApiError::Unauthorized.into_response()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.error, "Unauthorized");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_bad_request_includes_message() {
        let (status, body) =
            extract_response(ApiError::BadRequest("Missing jobID".into()).into_response()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.details.as_deref(), Some("Missing jobID"));
    }

    #[test]
    fn test_error_response_serialization_skips_empty_details() {
        let json = serde_json::to_string(&ErrorResponse::new("Oops")).unwrap();
        assert_eq!(json, r#"{"error":"Oops"}"#);
    }
}
