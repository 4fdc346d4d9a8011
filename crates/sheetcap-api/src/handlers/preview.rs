//! Preview handlers backing the ROI chooser: a single decoded frame to
//! anchor the quad on, and source resolution so the UI knows what it's
//! about to submit.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use sheetcap_media::FrameSource;

use crate::error::{ApiError, ApiResult};
use crate::handlers::jobs::SourceType;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PreviewFrameRequest {
    pub source_type: SourceType,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub youtube_url: Option<String>,
    #[serde(default)]
    pub start_sec: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PreviewFrameResponse {
    pub image_path: PathBuf,
}

/// `POST /preview/frame`
pub async fn preview_frame(State(state): State<AppState>, Json(req): Json<PreviewFrameRequest>) -> ApiResult<Json<PreviewFrameResponse>> {
    let path = match req.source_type {
        SourceType::Local => req.file_path.map(PathBuf::from).ok_or_else(|| ApiError::bad_request("file_path is required"))?,
        SourceType::Youtube => {
            return Err(ApiError::NotImplemented("remote clip fetch is not implemented, supply source_type=local".to_string()));
        }
    };

    let capabilities = Arc::new(state.orchestrator.capabilities().clone());
    let frame_source = FrameSource::new(capabilities);
    let frame = frame_source.extract_preview(&path, req.start_sec.unwrap_or(0.0)).await.map_err(|e| ApiError::bad_request(e.to_string()))?;

    let previews_dir = state.orchestrator.jobs_dir().join("previews");
    tokio::fs::create_dir_all(&previews_dir).await.map_err(|e| ApiError::internal(e.to_string()))?;

    let image_path = previews_dir.join(format!("{}.png", uuid::Uuid::new_v4()));
    let image = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels)
        .ok_or_else(|| ApiError::internal("decoded preview frame buffer dimensions mismatch"))?;
    image.save(&image_path).map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(PreviewFrameResponse { image_path }))
}

#[derive(Debug, Deserialize)]
pub struct PreviewSourceRequest {
    pub source_type: SourceType,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub youtube_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewSourceResponse {
    pub video_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub from_cache: bool,
}

/// `POST /preview/source`. Remote fetch-and-cache is out of scope for this
/// build (§ "Out of scope"): a `youtube_url` request always errors, a
/// `file_path` request just confirms the file exists.
pub async fn preview_source(Json(req): Json<PreviewSourceRequest>) -> ApiResult<Json<PreviewSourceResponse>> {
    match req.source_type {
        SourceType::Local => {
            let path = req.file_path.map(PathBuf::from).ok_or_else(|| ApiError::bad_request("file_path is required"))?;
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(ApiError::bad_request(format!("file not found: {}", path.display())));
            }
            Ok(Json(PreviewSourceResponse { video_path: path, video_url: None, from_cache: false }))
        }
        SourceType::Youtube => Err(ApiError::NotImplemented("remote clip fetch is not implemented, supply source_type=local".to_string())),
    }
}
