//! Orchestrator configuration, loaded from `DRUMSHEET_*` environment
//! variables the same way `WorkerConfig::from_env()` loads `WORKER_*`.

use std::path::PathBuf;
use std::time::Duration;

use sheetcap_media::HwAccel;

/// `DRUMSHEET_HWACCEL` override: `auto` defers to the startup probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwAccelOverride {
    Auto,
    Forced(HwAccel),
}

impl HwAccelOverride {
    fn parse(value: &str) -> Self {
        match value {
            "cuda" => Self::Forced(HwAccel::Cuda),
            "videotoolbox" => Self::Forced(HwAccel::VideoToolbox),
            "d3d11va" => Self::Forced(HwAccel::D3d11va),
            "dxva2" => Self::Forced(HwAccel::Dxva2),
            "vaapi" => Self::Forced(HwAccel::Vaapi),
            "qsv" => Self::Forced(HwAccel::Qsv),
            "none" => Self::Forced(HwAccel::None),
            _ => Self::Auto,
        }
    }
}

/// `DRUMSHEET_UPSCALE_ENGINE` override. Only `auto` and `ffmpeg` can
/// actually select a working backend in this build -- `hat`/`opencv` name
/// backends that are structurally modeled (§4.6 selection order) but never
/// self-test successfully, see `sheetcap_media::capabilities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscaleEngineOverride {
    Auto,
    Hat,
    Opencv,
    Ffmpeg,
}

impl UpscaleEngineOverride {
    fn parse(value: &str) -> Self {
        match value {
            "hat" => Self::Hat,
            "opencv" => Self::Opencv,
            "ffmpeg" => Self::Ffmpeg,
            _ => Self::Auto,
        }
    }
}

/// Orchestrator-wide configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Root directory under which every job gets its own `jobs/<job_id>/`
    /// workspace.
    pub jobs_dir: PathBuf,
    /// Maximum number of jobs running concurrently (§5: "default = number of
    /// CPU cores / 2, min 1").
    pub max_concurrent_jobs: usize,
    /// Overall job timeout before it is force-failed.
    pub job_timeout: Duration,
    /// Graceful shutdown grace period.
    pub shutdown_timeout: Duration,
    /// GPU context hold timeout before other jobs fall back to CPU (§5,
    /// default 10s).
    pub gpu_lock_timeout: Duration,
    /// Cancellation/checkpoint interval in frames (§5, fixed at 64 but kept
    /// configurable for tests).
    pub checkpoint_interval: usize,
    pub hwaccel: HwAccelOverride,
    pub upscale_engine: UpscaleEngineOverride,
    pub upscale_sharpen: bool,
    pub ffmpeg_bin: Option<String>,
    pub ffprobe_bin: Option<String>,
    /// `DRUMSHEET_HAT_*` are read for configuration fidelity with §6's env
    /// var list, but the HAT backend has no implementation in this build
    /// (see DESIGN.md) -- `hat_enable` is inert.
    pub hat_enable: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("/tmp/sheetcap/jobs"),
            max_concurrent_jobs: default_parallelism(),
            job_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
            gpu_lock_timeout: Duration::from_secs(10),
            checkpoint_interval: 64,
            hwaccel: HwAccelOverride::Auto,
            upscale_engine: UpscaleEngineOverride::Auto,
            upscale_sharpen: true,
            ffmpeg_bin: None,
            ffprobe_bin: None,
            hat_enable: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            jobs_dir: std::env::var("DRUMSHEET_JOBS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/sheetcap/jobs")),
            max_concurrent_jobs: std::env::var("DRUMSHEET_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_parallelism),
            job_timeout: Duration::from_secs(
                std::env::var("DRUMSHEET_JOB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("DRUMSHEET_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            gpu_lock_timeout: Duration::from_secs(
                std::env::var("DRUMSHEET_GPU_LOCK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            checkpoint_interval: std::env::var("DRUMSHEET_CHECKPOINT_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(64),
            hwaccel: std::env::var("DRUMSHEET_HWACCEL")
                .map(|v| HwAccelOverride::parse(&v))
                .unwrap_or(HwAccelOverride::Auto),
            upscale_engine: std::env::var("DRUMSHEET_UPSCALE_ENGINE")
                .map(|v| UpscaleEngineOverride::parse(&v))
                .unwrap_or(UpscaleEngineOverride::Auto),
            upscale_sharpen: std::env::var("DRUMSHEET_UPSCALE_SHARPEN")
                .ok()
                .map(|v| v != "0")
                .unwrap_or(true),
            ffmpeg_bin: std::env::var("DRUMSHEET_FFMPEG_BIN").ok(),
            ffprobe_bin: std::env::var("DRUMSHEET_FFPROBE_BIN").ok(),
            hat_enable: std::env::var("DRUMSHEET_HAT_ENABLE")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_positive_parallelism() {
        let config = OrchestratorConfig::default();
        assert!(config.max_concurrent_jobs >= 1);
    }

    #[test]
    fn hwaccel_override_parses_known_values() {
        assert_eq!(HwAccelOverride::parse("cuda"), HwAccelOverride::Forced(HwAccel::Cuda));
        assert_eq!(HwAccelOverride::parse("bogus"), HwAccelOverride::Auto);
    }
}
