//! Stage runner wiring `FrameSource -> RoiTracker -> Rectifier -> Dedup ->
//! Stitcher -> Upscaler -> PageComposer` for one job, reporting progress
//! through the `JobRegistry` as it advances `JobStep` (§4.8 state machine).

use std::sync::Arc;

use sheetcap_media::{
    Capabilities, Dedup, FrameSource, PageComposer, Rectifier, RoiTracker, Stitcher, TrackerEvent, Upscaler,
};
use sheetcap_models::{
    ExportFormat, Job, JobId, JobStep, LayoutHint, Manifest, PageCandidate, Quadrilateral, RectifiedCapture, Resolution, ReviewCandidate,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::gpu_guard::{GpuDecision, GpuGuard};
use crate::registry::JobRegistry;
use crate::workspace::JobWorkspace;

/// Everything a pipeline run needs that isn't specific to one job.
pub struct PipelineContext {
    pub capabilities: Arc<Capabilities>,
    pub gpu_guard: GpuGuard,
    pub checkpoint_interval: usize,
    pub upscale_sharpen: bool,
}

/// Run every stage for `job_id` to completion, writing progress into
/// `registry` as each step advances and persisting the final `Job` (done or
/// error) before returning.
pub async fn run(
    registry: &JobRegistry,
    job_id: &JobId,
    workspace: &JobWorkspace,
    ctx: &PipelineContext,
    mut cancel_rx: watch::Receiver<bool>,
) -> OrchestratorResult<()> {
    workspace.create().await?;
    registry.update(job_id, |j| j.start())?;

    match run_stages(registry, job_id, workspace, ctx, &mut cancel_rx).await {
        Ok(manifest) => {
            registry.update(job_id, |j| {
                let mut j = j;
                j.manifest = manifest;
                j.complete()
            })?;
            Ok(())
        }
        Err(err) => {
            let code = err.error_code();
            warn!(job_id = %job_id, error_code = %code, "job failed");
            let job = registry.update(job_id, |j| {
                if code == sheetcap_models::ErrorCode::Cancelled {
                    j.cancel()
                } else {
                    j.fail(code, err.to_string())
                }
            })?;
            // Scenario: cancel/fail before any stage wrote a manifest. The
            // client still expects manifest.json present (images=[]) so it
            // can poll files() without a NotFound.
            workspace.write_manifest(&job.manifest).await?;
            Err(err)
        }
    }
}

async fn run_stages(
    registry: &JobRegistry,
    job_id: &JobId,
    workspace: &JobWorkspace,
    ctx: &PipelineContext,
    cancel_rx: &mut watch::Receiver<bool>,
) -> OrchestratorResult<Manifest> {
    let job = registry.get(job_id)?;

    registry.update(job_id, |j| j.advance(JobStep::Extracting, 0.05, "extracting frames"))?;
    let frame_source = FrameSource::new(Arc::clone(&ctx.capabilities)).with_cancel(cancel_rx.clone());
    let frames = frame_source
        .extract(
            job.source.path(),
            job.window.start_sec,
            job.window.end_sec,
            job.options.extract.sampling_fps,
            &workspace.frames_dir(),
        )
        .await?;

    let (source_w, source_h) = frames
        .first()
        .map(|f| (f.width, f.height))
        .unwrap_or((0, 0));
    if !job.options.detect.roi.is_valid_for_frame(source_w, source_h) {
        return Err(OrchestratorError::InvalidRoi);
    }

    registry.update(job_id, |j| j.advance(JobStep::Detecting, 0.25, "tracking region of interest"))?;
    let mut tracker = RoiTracker::new(job.options.detect.roi, job.options.detect.layout_hint, source_w, source_h);
    let mut stabilized = Vec::with_capacity(frames.len());
    for (index, frame) in frames.iter().enumerate() {
        if checkpoint_cancelled(index, ctx.checkpoint_interval, cancel_rx) {
            return Err(OrchestratorError::Media(sheetcap_media::MediaError::Cancelled));
        }
        stabilized.push(tracker.track(frame));
    }

    registry.update(job_id, |j| j.advance(JobStep::Rectifying, 0.4, "rectifying captures"))?;
    let rectifier = Rectifier::new();
    let mut rectified: Vec<(RectifiedCapture, TrackerEvent)> = Vec::with_capacity(frames.len());
    for (index, (frame, stab)) in frames.iter().zip(stabilized.into_iter()).enumerate() {
        if checkpoint_cancelled(index, ctx.checkpoint_interval, cancel_rx) {
            return Err(OrchestratorError::Media(sheetcap_media::MediaError::Cancelled));
        }
        let capture = rectifier.rectify(frame, &stab.quad)?;
        rectified.push((capture, stab.event));
    }

    let mut dedup = Dedup::new(job.options.extract.sensitivity);
    let deduped = dedup.filter(rectified);

    let review_candidates = save_review_candidates(workspace, &deduped).await?;

    let layout_hint = job.options.detect.layout_hint;
    let pages = if layout_hint.is_page_mode() {
        registry.update(job_id, |j| j.advance(JobStep::PageCluster, 0.55, "clustering pages"))?;
        let stitcher = Stitcher::new(job.options.stitch.overlap_threshold, job.options.stitch.dedupe_level);
        stitcher.cluster_pages(&deduped)
    } else if job.options.stitch.enable {
        registry.update(job_id, |j| j.advance(JobStep::Stitching, 0.55, "stitching scroll strip"))?;
        let stitcher = Stitcher::new(job.options.stitch.overlap_threshold, job.options.stitch.dedupe_level);
        stitcher.stitch_scroll(&deduped).map_err(|e| map_stitch_error(e))?
    } else {
        registry.update(job_id, |j| j.advance(JobStep::Stitching, 0.55, "composing one page per capture"))?;
        one_page_per_capture(deduped)
    };

    let (pages, upscaled_frames) = if job.options.upscale.enable {
        registry.update(job_id, |j| j.advance(JobStep::Upscaling, 0.7, "upscaling pages"))?;
        upscale_pages(ctx, workspace, pages, job.options.upscale.factor, job.options.upscale.gpu_only).await?
    } else {
        (pages, Vec::new())
    };

    registry.update(job_id, |j| j.advance(JobStep::Exporting, 0.9, "composing output"))?;
    let composer = PageComposer::new(job.options.export.formats.clone());
    let scroll_mode = matches!(layout_hint, LayoutHint::FullScroll) && job.options.stitch.enable;
    let output = composer.compose(&pages, &workspace.pages_dir(), scroll_mode)?;

    let pdf = match output.pdf {
        Some(path) => {
            let dest = workspace.pdf_path();
            tokio::fs::rename(&path, &dest).await?;
            Some(dest)
        }
        None => None,
    };

    let mut manifest = Manifest::empty(workspace.root().to_path_buf());
    manifest.images = output.images;
    manifest.review_candidates = review_candidates;
    manifest.pdf = pdf;
    manifest.upscaled_frames = upscaled_frames;
    manifest.source_resolution = Resolution { w: source_w, h: source_h };
    manifest.runtime.overall_mode = if ctx.capabilities.has_gpu_upscale() { "gpu".to_string() } else { "cpu".to_string() };
    manifest.runtime.ffmpeg_mode = ctx.capabilities.preferred_hwaccel().as_ffmpeg_name().to_string();
    manifest.runtime.gpu_name = ctx.capabilities.gpu_name.clone();
    manifest.runtime.cpu_name = ctx.capabilities.cpu_name.clone();

    workspace.write_manifest(&manifest).await?;

    info!(job_id = %job_id, pages = manifest.images.len(), "job exported");
    Ok(manifest)
}

/// Persist every surviving deduped capture to `rectified_dir` as a
/// reviewable pre-compose image (§3 `review_candidates[]`).
async fn save_review_candidates(workspace: &JobWorkspace, captures: &[RectifiedCapture]) -> OrchestratorResult<Vec<ReviewCandidate>> {
    let mut candidates = Vec::with_capacity(captures.len());
    for (index, capture) in captures.iter().enumerate() {
        let image = image::RgbImage::from_raw(capture.width, capture.height, capture.pixels.clone())
            .ok_or_else(|| OrchestratorError::internal("rectified capture buffer dimensions mismatch"))?;
        let path = workspace.rectified_dir().join(format!("capture_{:04}.png", index + 1));
        image.save(&path)?;
        candidates.push(ReviewCandidate { path, version: 0 });
    }
    Ok(candidates)
}

fn one_page_per_capture(captures: Vec<RectifiedCapture>) -> Vec<PageCandidate> {
    captures
        .into_iter()
        .map(|c| PageCandidate::new(sheetcap_models::PageOrigin::Stitched { frame_indices: vec![c.source_frame_index] }, c.width, c.height, c.pixels))
        .collect()
}

fn map_stitch_error(err: sheetcap_media::MediaError) -> OrchestratorError {
    match err {
        sheetcap_media::MediaError::Cancelled => OrchestratorError::Media(err),
        other => OrchestratorError::Media(sheetcap_media::MediaError::StitchFailed(other.to_string())),
    }
}

/// Runs each page through the upscaler, returning the (possibly enlarged)
/// pages alongside the on-disk paths of the ones actually upscaled.
/// "Actually upscaled" excludes both the GPU-busy CPU passthrough path and
/// `Upscaler::upscale`'s own silent skip when no backend is available --
/// the dimensions only grow when a backend really ran, so that is the
/// signal used rather than `GpuDecision` alone.
async fn upscale_pages(
    ctx: &PipelineContext,
    workspace: &JobWorkspace,
    pages: Vec<PageCandidate>,
    factor: sheetcap_models::UpscaleFactor,
    gpu_only: bool,
) -> OrchestratorResult<(Vec<PageCandidate>, Vec<std::path::PathBuf>)> {
    let upscaler = Upscaler::new(Arc::clone(&ctx.capabilities)).with_sharpen(ctx.upscale_sharpen);
    let mut out = Vec::with_capacity(pages.len());
    let mut upscaled_frames = Vec::new();
    for (index, page) in pages.into_iter().enumerate() {
        let (decision, permit) = ctx.gpu_guard.acquire().await;
        match decision {
            GpuDecision::Granted => {
                let (orig_w, orig_h) = (page.width, page.height);
                let upscaled = upscaler.upscale(page, factor, gpu_only).await?;
                drop(permit);
                if upscaled.width != orig_w || upscaled.height != orig_h {
                    let image = image::RgbImage::from_raw(upscaled.width, upscaled.height, upscaled.pixels.clone())
                        .ok_or_else(|| OrchestratorError::internal("upscaled page buffer dimensions mismatch"))?;
                    let path = workspace.upscaled_dir().join(format!("frame_{:04}.png", index + 1));
                    image.save(&path)?;
                    upscaled_frames.push(path);
                }
                out.push(upscaled);
            }
            GpuDecision::FallbackToCpu => {
                if gpu_only {
                    return Err(OrchestratorError::Media(sheetcap_media::MediaError::NoGpuUpscale));
                }
                warn!("GPU context busy past timeout, passing page through unscaled");
                out.push(page);
            }
        }
    }
    Ok((out, upscaled_frames))
}

fn checkpoint_cancelled(index: usize, interval: usize, cancel_rx: &watch::Receiver<bool>) -> bool {
    interval > 0 && index % interval == 0 && *cancel_rx.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcap_models::{JobId, PageOrigin};

    #[test]
    fn checkpoint_fires_only_at_interval() {
        let (tx, rx) = watch::channel(true);
        assert!(checkpoint_cancelled(0, 64, &rx));
        assert!(!checkpoint_cancelled(1, 64, &rx));
        assert!(checkpoint_cancelled(64, 64, &rx));
        drop(tx);
    }

    fn sample_page(w: u32, h: u32) -> PageCandidate {
        PageCandidate::new(PageOrigin::Stitched { frame_indices: vec![0] }, w, h, vec![200; (w * h * 3) as usize])
    }

    #[tokio::test]
    async fn upscale_pages_with_no_backend_leaves_upscaled_frames_empty() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = JobWorkspace::new(dir.path(), &JobId::new());
        workspace.create().await.unwrap();

        let ctx = PipelineContext {
            capabilities: Arc::new(Capabilities::none()),
            gpu_guard: GpuGuard::new(std::time::Duration::from_millis(50)),
            checkpoint_interval: 64,
            upscale_sharpen: true,
        };

        let (pages, upscaled_frames) = upscale_pages(&ctx, &workspace, vec![sample_page(10, 10)], sheetcap_models::UpscaleFactor::Two, false)
            .await
            .unwrap();
        assert_eq!(pages[0].width, 10);
        assert!(upscaled_frames.is_empty());
    }
}
