//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sheetcap_models::ErrorCode;
use sheetcap_orchestrator::OrchestratorError;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Orchestrator(err) => orchestrator_status_code(err),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Map the fixed §7 error-code taxonomy onto HTTP status the way the
/// teacher's `ApiError::Storage`/`Firestore`/`Queue` conversions bridged
/// domain errors into a status code at the response boundary.
fn orchestrator_status_code(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::JobNotFound(_) | OrchestratorError::CaptureNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::PathTraversal(_) => StatusCode::FORBIDDEN,
        _ => match err.error_code() {
            ErrorCode::InputInvalid => StatusCode::BAD_REQUEST,
            ErrorCode::SourceUnavailable => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::Cancelled => StatusCode::CONFLICT,
            ErrorCode::DecodeFailed
            | ErrorCode::TrackingLost
            | ErrorCode::StitchFailed
            | ErrorCode::UpscaleUnavailable
            | ErrorCode::UpscaleFailed
            | ErrorCode::ExportFailed
            | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let code = match &self {
            ApiError::Orchestrator(err) => Some(err.error_code().as_str()),
            _ => None,
        };

        let detail = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { detail, code })).into_response()
    }
}
