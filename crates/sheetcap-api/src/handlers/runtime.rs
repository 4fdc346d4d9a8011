//! `GET /runtime`: reports the hardware/software capabilities the running
//! process probed at startup, so a client can grey out unsupported options
//! (GPU upscale, a given hwaccel) before submitting a job.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RuntimeResponse {
    pub available_hwaccels: Vec<&'static str>,
    pub preferred_hwaccel: &'static str,
    pub available_upscale_backends: Vec<&'static str>,
    pub has_gpu_upscale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_name: Option<String>,
}

pub async fn runtime(State(state): State<AppState>) -> Json<RuntimeResponse> {
    let caps = state.orchestrator.capabilities();
    Json(RuntimeResponse {
        available_hwaccels: caps.available_hwaccels.iter().map(|h| h.as_ffmpeg_name()).collect(),
        preferred_hwaccel: caps.preferred_hwaccel().as_ffmpeg_name(),
        available_upscale_backends: caps.available_upscale_backends.iter().map(|b| b.as_str()).collect(),
        has_gpu_upscale: caps.has_gpu_upscale(),
        gpu_name: caps.gpu_name.clone(),
        cpu_name: caps.cpu_name.clone(),
    })
}
