#![deny(unreachable_patterns)]
//! Sheet capture job orchestrator.
//!
//! This crate provides:
//! - The multi-stage pipeline runner (extract -> track -> rectify -> dedupe
//!   -> stitch/cluster -> upscale -> compose)
//! - `JobOrchestrator`, the in-process scheduler that runs jobs concurrently,
//!   reports progress, and handles cancellation
//! - Review-and-recrop operations over a job's partial output
//! - Per-job workspace layout and path-traversal-safe capture resolution

pub mod capture_editor;
pub mod config;
pub mod error;
pub mod gpu_guard;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod workspace;

pub use capture_editor::{CaptureEditor, CropResult};
pub use config::{HwAccelOverride, OrchestratorConfig, UpscaleEngineOverride};
pub use error::{OrchestratorError, OrchestratorResult};
pub use gpu_guard::{GpuDecision, GpuGuard, GpuPermit};
pub use logging::JobLogger;
pub use orchestrator::{JobOrchestrator, JobStatus};
pub use pipeline::PipelineContext;
pub use registry::JobRegistry;
pub use source::{LocalFileResolver, SourceRequest, SourceResolver};
pub use workspace::JobWorkspace;
