//! Job lifecycle handlers: submit, poll status, fetch the manifest, review
//! export, recrop a capture, cancel, and purge.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use sheetcap_models::{ErrorCode, ExportFormat, JobId, JobState, JobStep, Manifest, PipelineOptions, Quadrilateral, TimeWindow};
use sheetcap_orchestrator::SourceRequest;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// `POST /jobs` request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Local,
    Youtube,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub source_type: SourceType,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub youtube_url: Option<String>,
    #[serde(default)]
    pub start_sec: Option<f64>,
    #[serde(default)]
    pub end_sec: Option<f64>,
    pub options: PipelineOptions,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,
}

/// `POST /jobs`
pub async fn create_job(State(state): State<AppState>, Json(req): Json<CreateJobRequest>) -> ApiResult<Json<CreateJobResponse>> {
    let source_request = match req.source_type {
        SourceType::Local => {
            let path = req.file_path.ok_or_else(|| ApiError::bad_request("file_path is required for source_type=local"))?;
            SourceRequest::LocalPath(PathBuf::from(path))
        }
        SourceType::Youtube => {
            let url = req.youtube_url.ok_or_else(|| ApiError::bad_request("youtube_url is required for source_type=youtube"))?;
            SourceRequest::Url(url)
        }
    };

    let window = TimeWindow::new(req.start_sec, req.end_sec);

    let job_id = state.orchestrator.submit(source_request, window, req.options).await?;
    metrics::record_job_submitted();
    info!(job_id = %job_id, "job submitted");

    Ok(Json(CreateJobResponse { job_id: job_id.as_str().to_string() }))
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub state: JobState,
    pub step: JobStep,
    pub progress: f32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

/// `GET /jobs/{id}`
pub async fn get_job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<JobStatusResponse>> {
    let id = JobId::from_string(job_id.clone());
    let status = state.orchestrator.status(&id)?;

    if status.state.is_terminal() {
        match status.state {
            JobState::Done => metrics::record_job_completed(),
            JobState::Error | JobState::Cancelled => metrics::record_job_failed(),
            _ => {}
        }
    }

    Ok(Json(JobStatusResponse {
        job_id,
        state: status.state,
        step: status.step,
        progress: status.progress,
        message: status.message,
        error_code: status.error_code,
    }))
}

/// `GET /jobs/{id}/files`
pub async fn get_job_files(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<Manifest>> {
    let id = JobId::from_string(job_id);
    let manifest = state.orchestrator.files(&id)?;
    Ok(Json(manifest))
}

#[derive(Debug, Deserialize)]
pub struct ReviewExportRequest {
    pub keep_captures: Vec<PathBuf>,
    pub formats: Vec<ExportFormat>,
}

/// `POST /jobs/{id}/review-export`
pub async fn review_export(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<ReviewExportRequest>,
) -> ApiResult<Json<Manifest>> {
    let id = JobId::from_string(job_id);
    let manifest = state.orchestrator.review_export(&id, &req.keep_captures, req.formats).await?;
    Ok(Json(manifest))
}

#[derive(Debug, Deserialize)]
pub struct CaptureCropRequest {
    pub capture_path: PathBuf,
    pub roi: Quadrilateral,
}

#[derive(Debug, Serialize)]
pub struct CaptureCropResponse {
    pub capture_path: PathBuf,
    pub w: u32,
    pub h: u32,
}

/// `POST /jobs/{id}/capture-crop`
pub async fn capture_crop(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<CaptureCropRequest>,
) -> ApiResult<Json<CaptureCropResponse>> {
    let id = JobId::from_string(job_id);
    let result = state.orchestrator.crop_capture(&id, &req.capture_path, req.roi)?;
    Ok(Json(CaptureCropResponse { capture_path: result.capture_path, w: result.width, h: result.height }))
}

/// `POST /jobs/{id}/cancel`
pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let id = JobId::from_string(job_id);
    state.orchestrator.cancel(&id)?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

/// `DELETE /jobs/{id}`
pub async fn purge_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let id = JobId::from_string(job_id);
    state.orchestrator.purge(&id).await?;
    Ok(Json(serde_json::json!({ "purged": true })))
}
