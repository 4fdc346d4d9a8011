//! Orchestrator error types, rolled up into the fixed §7 `error_code`
//! taxonomy at the job boundary the way the teacher's `WorkerError` feeds
//! DLQ routing decisions.

use sheetcap_media::MediaError;
use sheetcap_models::ErrorCode;
use thiserror::Error;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("ROI too small or out of bounds")]
    InvalidRoi,

    #[error("invalid time window: {0}")]
    InvalidTimeWindow(String),

    #[error("capture path escapes job workspace: {0}")]
    PathTraversal(String),

    #[error("capture not found: {0}")]
    CaptureNotFound(String),

    #[error("review_export requires at least one kept capture")]
    EmptyKeepSet,

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Roll this error up into the fixed §7 taxonomy the `Job` records on
    /// failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            OrchestratorError::JobNotFound(_) => ErrorCode::InputInvalid,
            OrchestratorError::SourceUnavailable(_) => ErrorCode::SourceUnavailable,
            OrchestratorError::InvalidRoi => ErrorCode::InputInvalid,
            OrchestratorError::InvalidTimeWindow(_) => ErrorCode::InputInvalid,
            OrchestratorError::PathTraversal(_) => ErrorCode::InputInvalid,
            OrchestratorError::CaptureNotFound(_) => ErrorCode::InputInvalid,
            OrchestratorError::EmptyKeepSet => ErrorCode::InputInvalid,
            OrchestratorError::Media(media_err) => media_error_code(media_err),
            OrchestratorError::Io(_) => ErrorCode::ExportFailed,
            OrchestratorError::Image(_) => ErrorCode::DecodeFailed,
            OrchestratorError::Internal(_) => ErrorCode::Internal,
        }
    }
}

fn media_error_code(err: &MediaError) -> ErrorCode {
    match err {
        MediaError::FfmpegNotFound | MediaError::FfprobeNotFound | MediaError::FfmpegFailed { .. } | MediaError::FfprobeFailed { .. } => {
            ErrorCode::DecodeFailed
        }
        MediaError::EmptyRange | MediaError::InvalidTimestamp(_) | MediaError::FileNotFound(_) => ErrorCode::InputInvalid,
        MediaError::Cancelled => ErrorCode::Cancelled,
        MediaError::TrackingLost(_) => ErrorCode::TrackingLost,
        MediaError::StitchFailed(_) => ErrorCode::StitchFailed,
        MediaError::NoGpuUpscale => ErrorCode::UpscaleUnavailable,
        MediaError::UpscaleFailed(_) => ErrorCode::UpscaleFailed,
        MediaError::ExportFailed(_) => ErrorCode::ExportFailed,
        MediaError::DownloadFailed { .. } => ErrorCode::SourceUnavailable,
        MediaError::Timeout(_) => ErrorCode::DecodeFailed,
        _ => ErrorCode::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_media_error_maps_to_cancelled_code() {
        let err = OrchestratorError::Media(MediaError::Cancelled);
        assert_eq!(err.error_code(), ErrorCode::Cancelled);
    }

    #[test]
    fn empty_keep_set_is_input_invalid() {
        assert_eq!(OrchestratorError::EmptyKeepSet.error_code(), ErrorCode::InputInvalid);
    }
}
