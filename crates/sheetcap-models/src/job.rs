//! The unit of work scheduled by the orchestrator.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::manifest::Manifest;
use crate::options::PipelineOptions;

/// Opaque stable identifier for a job, a UUIDv4 string under the hood.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Top-level job state. `queued -> running -> (done | error | cancelled)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Queued,
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Error => "error",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The pipeline step the worker is currently executing within `running`.
///
/// Backward transitions are forbidden except `review_export`, which re-enters
/// `Upscaling` from `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    #[default]
    Initializing,
    Extracting,
    Detecting,
    Rectifying,
    Stitching,
    PageCluster,
    Upscaling,
    Exporting,
    Done,
}

impl JobStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStep::Initializing => "initializing",
            JobStep::Extracting => "extracting",
            JobStep::Detecting => "detecting",
            JobStep::Rectifying => "rectifying",
            JobStep::Stitching => "stitching",
            JobStep::PageCluster => "page_cluster",
            JobStep::Upscaling => "upscaling",
            JobStep::Exporting => "exporting",
            JobStep::Done => "done",
        }
    }
}

impl fmt::Display for JobStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the source video comes from. Fetching a remote clip is modeled
/// behind `SourceResolver` in `sheetcap-orchestrator`; by the time a `Job`
/// exists the descriptor already names a file on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    /// A file already present on local disk.
    LocalPath { path: PathBuf },
    /// A clip fetched by a `SourceResolver` and cached on disk.
    FetchedClip { path: PathBuf, origin_url: String },
}

impl SourceDescriptor {
    pub fn path(&self) -> &PathBuf {
        match self {
            SourceDescriptor::LocalPath { path } => path,
            SourceDescriptor::FetchedClip { path, .. } => path,
        }
    }
}

/// Optional time window to extract from the source, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeWindow {
    pub start_sec: Option<f64>,
    pub end_sec: Option<f64>,
}

impl TimeWindow {
    pub fn new(start_sec: Option<f64>, end_sec: Option<f64>) -> Self {
        Self { start_sec, end_sec }
    }

    /// `end_sec <= start_sec` is `input_invalid` per the boundary cases in §8.
    pub fn is_valid(&self) -> bool {
        match (self.start_sec, self.end_sec) {
            (Some(start), Some(end)) => end > start,
            _ => true,
        }
    }
}

/// The unit of work. Exclusively owned by the `JobOrchestrator`; pipeline
/// stages never retain state across jobs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,

    /// Directory exclusively owned by this job: `jobs/<job_id>/`.
    pub workspace_dir: PathBuf,

    pub source: SourceDescriptor,

    #[serde(default)]
    pub window: TimeWindow,

    pub options: PipelineOptions,

    pub state: JobState,
    pub step: JobStep,

    /// Fractional progress in `[0,1]`, monotonic non-decreasing.
    pub progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,

    pub manifest: Manifest,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(workspace_dir: PathBuf, source: SourceDescriptor, window: TimeWindow, options: PipelineOptions) -> Self {
        let now = Utc::now();
        let id = JobId::new();
        Self {
            id,
            workspace_dir: workspace_dir.clone(),
            source,
            window,
            options,
            state: JobState::Queued,
            step: JobStep::Initializing,
            progress: 0.0,
            message: "queued".to_string(),
            error_code: None,
            manifest: Manifest::empty(workspace_dir),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(mut self) -> Self {
        self.state = JobState::Running;
        self.step = JobStep::Initializing;
        self.started_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    pub fn advance(mut self, step: JobStep, progress: f32, message: impl Into<String>) -> Self {
        self.step = step;
        self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        self.message = message.into();
        self.updated_at = Utc::now();
        self
    }

    pub fn complete(mut self) -> Self {
        self.state = JobState::Done;
        self.step = JobStep::Done;
        self.progress = 1.0;
        self.message = "done".to_string();
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    pub fn fail(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
        self.state = JobState::Error;
        self.error_code = Some(code);
        self.message = message.into();
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    pub fn cancel(mut self) -> Self {
        self.state = JobState::Cancelled;
        self.error_code = Some(ErrorCode::Cancelled);
        self.message = "cancelled".to_string();
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Re-enter `Upscaling` from `Done` for a `review_export` pass.
    pub fn reopen_for_review(mut self) -> Self {
        self.state = JobState::Running;
        self.step = JobStep::Upscaling;
        self.message = "review_export".to_string();
        self.updated_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::PipelineOptions;

    fn sample_job() -> Job {
        Job::new(
            PathBuf::from("/tmp/jobs/x"),
            SourceDescriptor::LocalPath { path: PathBuf::from("/tmp/in.mp4") },
            TimeWindow::default(),
            PipelineOptions::default(),
        )
    }

    #[test]
    fn starts_in_queued() {
        let job = sample_job();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.step, JobStep::Initializing);
    }

    #[test]
    fn advance_never_decreases_progress() {
        let job = sample_job().start().advance(JobStep::Extracting, 0.5, "extracting");
        let job = job.advance(JobStep::Detecting, 0.2, "detecting");
        assert!(job.progress >= 0.5);
    }

    #[test]
    fn time_window_rejects_empty_range() {
        let w = TimeWindow::new(Some(5.0), Some(5.0));
        assert!(!w.is_valid());
        let w = TimeWindow::new(Some(5.0), Some(1.0));
        assert!(!w.is_valid());
        let w = TimeWindow::new(None, None);
        assert!(w.is_valid());
    }

    #[test]
    fn fail_sets_error_code_and_terminal_state() {
        let job = sample_job().start().fail(ErrorCode::DecodeFailed, "ffmpeg exited 1");
        assert!(job.state.is_terminal());
        assert_eq!(job.error_code, Some(ErrorCode::DecodeFailed));
    }
}
