//! C8 `JobOrchestrator`: schedules stages, publishes progress, handles
//! cancellation/failure, and routes `CaptureEditor` operations. Shaped
//! after the teacher's `JobExecutor` -- a semaphore-bounded worker pool
//! spawning one task per job -- with the Redis-backed queue replaced by
//! the in-process `JobRegistry` (§5: no distributed broker in this system).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sheetcap_media::Capabilities;
use sheetcap_models::{ExportFormat, Job, JobId, JobState, Manifest, PipelineOptions, Quadrilateral, SourceDescriptor, TimeWindow};
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use crate::capture_editor::{CaptureEditor, CropResult};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::gpu_guard::GpuGuard;
use crate::pipeline::{self, PipelineContext};
use crate::registry::JobRegistry;
use crate::source::{LocalFileResolver, SourceRequest, SourceResolver};
use crate::workspace::JobWorkspace;

/// Snapshot returned by `status` (§4.8 contract).
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    pub step: sheetcap_models::JobStep,
    pub progress: f32,
    pub message: String,
    pub error_code: Option<sheetcap_models::ErrorCode>,
}

impl From<&Job> for JobStatus {
    fn from(job: &Job) -> Self {
        Self {
            state: job.state,
            step: job.step,
            progress: job.progress,
            message: job.message.clone(),
            error_code: job.error_code,
        }
    }
}

pub struct JobOrchestrator {
    config: OrchestratorConfig,
    capabilities: Arc<Capabilities>,
    registry: Arc<JobRegistry>,
    semaphore: Arc<Semaphore>,
    gpu_guard: GpuGuard,
    resolver: Arc<dyn SourceResolver>,
    capture_editor: CaptureEditor,
    cancel_signals: Arc<dashmap::DashMap<JobId, watch::Sender<bool>>>,
}

impl JobOrchestrator {
    pub fn new(config: OrchestratorConfig, capabilities: Capabilities) -> Self {
        let gpu_guard = GpuGuard::new(config.gpu_lock_timeout);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            config,
            capabilities: Arc::new(capabilities),
            registry: Arc::new(JobRegistry::new()),
            semaphore,
            gpu_guard,
            resolver: Arc::new(LocalFileResolver),
            capture_editor: CaptureEditor::new(),
            cancel_signals: Arc::new(dashmap::DashMap::new()),
        }
    }

    /// `submit(source, window, options) -> job_id`: resolve the source,
    /// register the job, and spawn a worker task that runs it to
    /// completion under the configured concurrency cap.
    pub async fn submit(&self, source_request: SourceRequest, window: TimeWindow, options: PipelineOptions) -> OrchestratorResult<JobId> {
        if !window.is_valid() {
            return Err(OrchestratorError::InvalidTimeWindow("end_sec <= start_sec".to_string()));
        }

        let resolved_path = self.resolver.resolve(&source_request).await?;
        let source = match source_request {
            SourceRequest::LocalPath(_) => SourceDescriptor::LocalPath { path: resolved_path.clone() },
            SourceRequest::Url(url) => SourceDescriptor::FetchedClip { path: resolved_path.clone(), origin_url: url },
        };

        let job_id_placeholder = JobId::new();
        let workspace_dir = self.config.jobs_dir.join(job_id_placeholder.as_str());
        let mut job = Job::new(workspace_dir, source, window, options);
        job.id = job_id_placeholder;
        let job_id = job.id.clone();

        self.registry.insert(job);
        self.spawn_worker(job_id.clone());
        Ok(job_id)
    }

    fn spawn_worker(&self, job_id: JobId) {
        let registry = Arc::clone(&self.registry);
        let semaphore = Arc::clone(&self.semaphore);
        let capabilities = Arc::clone(&self.capabilities);
        let gpu_guard = self.gpu_guard.clone();
        let checkpoint_interval = self.config.checkpoint_interval;
        let upscale_sharpen = self.config.upscale_sharpen;
        let job_timeout = self.config.job_timeout;
        let jobs_dir = self.config.jobs_dir.clone();
        let cancel_signals = Arc::clone(&self.cancel_signals);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        cancel_signals.insert(job_id.clone(), cancel_tx);

        tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            info!(job_id = %job_id, "job worker starting");

            let workspace = JobWorkspace::new(&jobs_dir, &job_id);
            let ctx = PipelineContext { capabilities, gpu_guard, checkpoint_interval, upscale_sharpen };

            let run = pipeline::run(&registry, &job_id, &workspace, &ctx, cancel_rx);
            match tokio::time::timeout(job_timeout, run).await {
                Ok(Ok(())) => info!(job_id = %job_id, "job completed"),
                Ok(Err(err)) => warn!(job_id = %job_id, %err, "job ended with error"),
                Err(_) => {
                    error!(job_id = %job_id, "job exceeded timeout, force-failing");
                    let _ = registry.update(&job_id, |j| j.fail(sheetcap_models::ErrorCode::Internal, "job exceeded timeout"));
                }
            }
            cancel_signals.remove(&job_id);
            drop(permit);
        });
    }

    pub fn status(&self, job_id: &JobId) -> OrchestratorResult<JobStatus> {
        self.registry.get(job_id).map(|job| JobStatus::from(&job))
    }

    pub fn files(&self, job_id: &JobId) -> OrchestratorResult<Manifest> {
        self.registry.get(job_id).map(|job| job.manifest)
    }

    /// Cooperative cancellation: flip the per-job flag the worker polls at
    /// checkpoints (§5). Terminal jobs are left untouched.
    pub fn cancel(&self, job_id: &JobId) -> OrchestratorResult<()> {
        let job = self.registry.get(job_id)?;
        if job.state.is_terminal() {
            return Ok(());
        }
        if let Some(tx) = self.cancel_signals.get(job_id) {
            let _ = tx.send(true);
        }
        Ok(())
    }

    pub fn crop_capture(&self, job_id: &JobId, capture_path: &std::path::Path, quad: Quadrilateral) -> OrchestratorResult<CropResult> {
        let workspace = JobWorkspace::new(&self.config.jobs_dir, job_id);
        self.capture_editor.crop_capture(&self.registry, job_id, &workspace, capture_path, quad)
    }

    pub async fn review_export(&self, job_id: &JobId, keep_captures: &[PathBuf], formats: Vec<ExportFormat>) -> OrchestratorResult<Manifest> {
        let workspace = JobWorkspace::new(&self.config.jobs_dir, job_id);
        self.capture_editor.review_export(&self.registry, job_id, &workspace, keep_captures, formats).await
    }

    /// Remove a job's workspace from disk and drop it from the registry.
    /// Terminal-only: an in-flight job must be cancelled first.
    pub async fn purge(&self, job_id: &JobId) -> OrchestratorResult<()> {
        let job = self.registry.get(job_id)?;
        if !job.state.is_terminal() {
            return Err(OrchestratorError::internal("cannot purge a job that is still running"));
        }
        let workspace = JobWorkspace::new(&self.config.jobs_dir, job_id);
        workspace.remove().await?;
        self.registry.remove(job_id);
        Ok(())
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Root directory under which job workspaces (and preview scratch
    /// files) live.
    pub fn jobs_dir(&self) -> &std::path::Path {
        &self.config.jobs_dir
    }

    /// Wait (best-effort, bounded by `shutdown_timeout`) for every
    /// in-flight job to vacate its semaphore permit, for graceful shutdown.
    pub async fn wait_for_idle(&self) {
        let total = self.config.max_concurrent_jobs.max(1);
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        while self.semaphore.available_permits() < total && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcap_models::Point;

    fn roi_options() -> PipelineOptions {
        let mut options = PipelineOptions::default();
        options.detect.roi = Quadrilateral::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0), Point::new(0.0, 10.0));
        options
    }

    #[tokio::test]
    async fn submit_missing_local_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OrchestratorConfig::default();
        config.jobs_dir = dir.path().to_path_buf();
        let orchestrator = JobOrchestrator::new(config, Capabilities::none());

        let result = orchestrator
            .submit(SourceRequest::LocalPath(PathBuf::from("/no/such/file.mp4")), TimeWindow::default(), roi_options())
            .await;
        assert!(matches!(result, Err(OrchestratorError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn submit_rejects_inverted_window() {
        let dir = tempfile::tempdir().unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = OrchestratorConfig::default();
        config.jobs_dir = dir.path().to_path_buf();
        let orchestrator = JobOrchestrator::new(config, Capabilities::none());

        let result = orchestrator
            .submit(
                SourceRequest::LocalPath(file.path().to_path_buf()),
                TimeWindow::new(Some(10.0), Some(2.0)),
                roi_options(),
            )
            .await;
        assert!(matches!(result, Err(OrchestratorError::InvalidTimeWindow(_))));
    }

    #[tokio::test]
    async fn cancel_unknown_job_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OrchestratorConfig::default();
        config.jobs_dir = dir.path().to_path_buf();
        let orchestrator = JobOrchestrator::new(config, Capabilities::none());
        let result = orchestrator.cancel(&JobId::from_string("missing"));
        assert!(matches!(result, Err(OrchestratorError::JobNotFound(_))));
    }
}
