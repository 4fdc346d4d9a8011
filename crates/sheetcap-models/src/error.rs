//! The fixed `error_code` taxonomy (§7), shared by every crate so the
//! orchestrator can roll up any stage error into one closed set.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    /// Missing file, empty URL, ROI too small, unsupported format.
    InputInvalid,
    /// Local file missing, preview fetch failed.
    SourceUnavailable,
    /// ffmpeg exit != 0 on extract or preview.
    DecodeFailed,
    /// Unrecoverable low-confidence tracking run with no fallback region.
    TrackingLost,
    /// No correlation peak above threshold for a full page.
    StitchFailed,
    /// `gpu_only` set but no GPU backend is usable.
    UpscaleUnavailable,
    /// Backend invocation failed mid-run.
    UpscaleFailed,
    /// Disk full, permission denied on write.
    ExportFailed,
    /// Observed cancellation.
    Cancelled,
    /// Unexpected programming error; carries a context string at the
    /// call site, not in the enum itself.
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InputInvalid => "input_invalid",
            ErrorCode::SourceUnavailable => "source_unavailable",
            ErrorCode::DecodeFailed => "decode_failed",
            ErrorCode::TrackingLost => "tracking_lost",
            ErrorCode::StitchFailed => "stitch_failed",
            ErrorCode::UpscaleUnavailable => "upscale_unavailable",
            ErrorCode::UpscaleFailed => "upscale_failed",
            ErrorCode::ExportFailed => "export_failed",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_snake_case() {
        assert_eq!(ErrorCode::UpscaleUnavailable.as_str(), "upscale_unavailable");
        let json = serde_json::to_string(&ErrorCode::DecodeFailed).unwrap();
        assert_eq!(json, "\"decode_failed\"");
    }
}
