// crates/server/src/routes/predict.rs
//! Prediction endpoints.
//!
//! - GET  /predict/config             taxonomy, groupings, model versions
//! - POST /predict                    classify one uploaded file
//! - POST /predict/batch              start a batch job
//! - GET  /predict/progress?jobID=    poll a job
//! - POST /predict/cancel?jobID=      cancel a running job

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use ecosort_core::{ClassLabel, GroupConfig, JobId, JobProgress, ModelInfo};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::metrics::RequestTimer;
use crate::state::AppState;
use crate::upload::{normalized_name, JobWorkspace, UploadError};

/// `?jobID=` query shared by every per-job route.
#[derive(Debug, Deserialize)]
pub struct JobQuery {
    #[serde(rename = "jobID", alias = "jobId")]
    pub job_id: Option<String>,
}

impl JobQuery {
    pub fn parse(&self) -> ApiResult<JobId> {
        let raw = self
            .job_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Missing jobID query parameter".into()))?;
        raw.parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid jobID: {raw}")))
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ConfigResponse {
    pub versions: Vec<ModelInfo>,
    pub classes: Vec<ClassLabel>,
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct PredictResponse {
    pub prediction: ClassLabel,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct BatchAccepted {
    pub job_id: JobId,
    pub total_items: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: JobId,
    pub message: String,
}

/// GET /v1/predict/config
async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    let taxonomy = &state.taxonomy;
    Json(ConfigResponse {
        versions: taxonomy.models.clone(),
        classes: taxonomy.classes.clone(),
        groups: taxonomy.groups.clone(),
    })
}

/// POST /v1/predict: multipart field `file`.
async fn predict_single(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<PredictResponse>> {
    let timer = RequestTimer::new("predict");
    let mut workspace = JobWorkspace::create(&state.config.upload_dir).await?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let raw_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;
        state.config.upload.validate(&raw_name, &bytes)?;
        workspace.persist(&normalized_name(&raw_name), &bytes).await?;
        break;
    }

    let item = workspace
        .items()
        .first()
        .ok_or_else(|| ApiError::BadRequest("Missing multipart field 'file'".into()))?;
    let prediction = state.classifier.classify(item).await?;
    tracing::info!(item = item.name(), label = %prediction.name, "Single prediction");
    timer.finish("200");

    Ok(Json(PredictResponse { prediction }))
}

/// POST /v1/predict/batch: multipart field `files`, repeated.
async fn predict_batch(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<BatchAccepted>)> {
    let timer = RequestTimer::new("predict_batch");
    let mut workspace = JobWorkspace::create(&state.config.upload_dir).await?;

    while let Some(field) = multipart.next_field().await? {
        if !matches!(field.name(), Some("files" | "files[]")) {
            continue;
        }
        let raw_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;
        state.config.upload.validate(&raw_name, &bytes)?;
        workspace.persist(&normalized_name(&raw_name), &bytes).await?;
    }

    if workspace.is_empty() {
        return Err(UploadError::NoFiles.into());
    }

    let total_items = workspace.len();
    let job_id = state.jobs.create_job(workspace.into_request());
    timer.finish("202");

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchAccepted {
            job_id,
            total_items,
            message: "Files uploaded successfully".into(),
        }),
    ))
}

/// GET /v1/predict/progress?jobID=
async fn get_progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Json<JobProgress>> {
    let job_id = query.parse()?;
    Ok(Json(state.jobs.poll(&job_id)?))
}

/// POST /v1/predict/cancel?jobID=
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> ApiResult<(StatusCode, Json<CancelResponse>)> {
    let job_id = query.parse()?;
    state.jobs.cancel(&job_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            job_id,
            message: "Cancellation requested".into(),
        }),
    ))
}

/// Build the prediction router. Upload routes get the configured body limit.
pub fn router(max_request_bytes: usize) -> Router<Arc<AppState>> {
    let uploads = Router::new()
        .route("/predict", post(predict_single))
        .route("/predict/batch", post(predict_batch))
        .layer(DefaultBodyLimit::max(max_request_bytes));

    Router::new()
        .route("/predict/config", get(get_config))
        .route("/predict/progress", get(get_progress))
        .route("/predict/cancel", post(cancel_job))
        .merge(uploads)
}
