//! C9 `CaptureEditor`: recrop a single already-produced capture, and
//! regenerate downstream pages from a user-selected subset of review
//! candidates (§4.9).

use std::path::{Path, PathBuf};

use image::RgbImage;
use sheetcap_media::{PageComposer, Rectifier};
use sheetcap_models::{ExportFormat, Frame, Job, JobId, Manifest, PageCandidate, PageOrigin, Quadrilateral, ReviewExportInfo};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::registry::JobRegistry;
use crate::workspace::JobWorkspace;

/// Result of a successful `crop_capture` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropResult {
    pub capture_path: PathBuf,
    pub width: u32,
    pub height: u32,
}

pub struct CaptureEditor {
    rectifier: Rectifier,
}

impl CaptureEditor {
    pub fn new() -> Self {
        Self { rectifier: Rectifier::new() }
    }

    /// Load `capture_path`, apply a new rectification with `quad`
    /// (interpreted in the capture's own pixel space), overwrite the file,
    /// and bump its review-candidate version as a UI cache-buster.
    pub fn crop_capture(
        &self,
        registry: &JobRegistry,
        job_id: &JobId,
        workspace: &JobWorkspace,
        capture_path: &Path,
        quad: Quadrilateral,
    ) -> OrchestratorResult<CropResult> {
        let resolved = workspace.resolve_capture(capture_path)?;

        let image = image::open(&resolved)?.to_rgb8();
        let (width, height) = image.dimensions();
        if !quad.is_valid_for_frame(width, height) {
            return Err(OrchestratorError::InvalidRoi);
        }

        let frame = Frame::new(0, 0.0, width, height, image.into_raw());
        let recropped = self.rectifier.rectify(&frame, &quad)?;
        let out = RgbImage::from_raw(recropped.width, recropped.height, recropped.pixels.clone())
            .ok_or_else(|| OrchestratorError::internal("recropped capture buffer dimensions mismatch"))?;
        out.save(&resolved)?;

        registry.update(job_id, |mut j| {
            if let Some(candidate) = j.manifest.review_candidates.iter_mut().find(|c| c.path == resolved) {
                candidate.version += 1;
            }
            j.updated_at = chrono::Utc::now();
            j
        })?;

        Ok(CropResult { capture_path: resolved, width: recropped.width, height: recropped.height })
    }

    /// Filter review candidates to `keep_captures`, rerun page composition
    /// over the kept set, overwrite the page images/PDF, and update the
    /// manifest -- both in the registry and on disk, so `manifest.json`
    /// keeps tracking the job's current export rather than the original
    /// pipeline run. Leaves the previous manifest intact on failure (§7
    /// propagation rule for `review_export`).
    pub async fn review_export(
        &self,
        registry: &JobRegistry,
        job_id: &JobId,
        workspace: &JobWorkspace,
        keep_captures: &[PathBuf],
        formats: Vec<ExportFormat>,
    ) -> OrchestratorResult<Manifest> {
        let job = registry.get(job_id)?;
        if keep_captures.is_empty() {
            return Err(OrchestratorError::EmptyKeepSet);
        }

        let kept = self.load_kept_candidates(workspace, &job, keep_captures)?;

        let composer = PageComposer::new(formats);
        let output = composer.compose(&kept, &workspace.pages_dir(), false)?;

        let mut manifest = job.manifest.clone();
        manifest.images = output.images;
        manifest.pdf = output.pdf.or(manifest.pdf);
        manifest.review_export = Some(ReviewExportInfo { kept_count: keep_captures.len() });

        registry.update(job_id, |j| {
            let mut j = j.reopen_for_review();
            j.manifest = manifest.clone();
            j.complete()
        })?;
        workspace.write_manifest(&manifest).await?;

        Ok(manifest)
    }

    fn load_kept_candidates(&self, workspace: &JobWorkspace, job: &Job, keep_captures: &[PathBuf]) -> OrchestratorResult<Vec<PageCandidate>> {
        let mut kept = Vec::with_capacity(keep_captures.len());
        for path in keep_captures {
            let resolved = workspace.resolve_capture(path)?;
            if !job.manifest.review_candidates.iter().any(|c| c.path == resolved) {
                return Err(OrchestratorError::CaptureNotFound(resolved.display().to_string()));
            }
            let image = image::open(&resolved)?.to_rgb8();
            let (w, h) = image.dimensions();
            kept.push(PageCandidate::new(PageOrigin::Stitched { frame_indices: vec![] }, w, h, image.into_raw()));
        }
        Ok(kept)
    }
}

impl Default for CaptureEditor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcap_models::{Point, SourceDescriptor, TimeWindow, PipelineOptions};

    fn sample_job(workspace_dir: PathBuf) -> Job {
        Job::new(
            workspace_dir,
            SourceDescriptor::LocalPath { path: PathBuf::from("/tmp/in.mp4") },
            TimeWindow::default(),
            PipelineOptions::default(),
        )
    }

    #[tokio::test]
    async fn review_export_rejects_empty_keep_set() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let job = sample_job(dir.path().to_path_buf());
        let job_id = job.id.clone();
        registry.insert(job);
        let workspace = JobWorkspace::new(dir.path(), &job_id);

        let editor = CaptureEditor::new();
        let result = editor.review_export(&registry, &job_id, &workspace, &[], vec![ExportFormat::Png]).await;
        assert!(matches!(result, Err(OrchestratorError::EmptyKeepSet)));
    }

    #[test]
    fn crop_capture_rejects_path_outside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let job = sample_job(dir.path().to_path_buf());
        let job_id = job.id.clone();
        registry.insert(job);
        let workspace = JobWorkspace::new(dir.path(), &job_id);

        let quad = Quadrilateral::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0), Point::new(0.0, 10.0));
        let editor = CaptureEditor::new();
        let result = editor.crop_capture(&registry, &job_id, &workspace, Path::new("../../etc/passwd"), quad);
        assert!(matches!(result, Err(OrchestratorError::PathTraversal(_))));
    }
}
