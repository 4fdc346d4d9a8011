//! C1 `FrameSource`: decode a time-bounded slice of a video into RGB frames
//! at a target sampling rate, preferring hardware decode when available.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sheetcap_models::Frame;
use tokio::sync::watch;
use tracing::warn;

use crate::capabilities::{Capabilities, HwAccel};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Cancellation/backlog checkpoint interval, frames in `extracting`/`detecting`.
pub const CHECKPOINT_INTERVAL: usize = 64;

/// Cap on undecoded frames kept resident while sweeping the output directory.
pub const BACKPRESSURE_CAP: usize = 256;

pub struct FrameSource {
    capabilities: Arc<Capabilities>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FrameSource {
    pub fn new(capabilities: Arc<Capabilities>) -> Self {
        Self {
            capabilities,
            cancel_rx: None,
        }
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// `sampling_fps` is derived from `Sensitivity::sampling_fps()`; this
    /// function takes the resolved value, not the sensitivity enum, so it
    /// stays decoupled from the options model.
    pub async fn extract(
        &self,
        video_path: &Path,
        start_sec: Option<f64>,
        end_sec: Option<f64>,
        sampling_fps: f64,
        output_dir: &Path,
    ) -> MediaResult<Vec<Frame>> {
        if let (Some(start), Some(end)) = (start_sec, end_sec) {
            if end <= start {
                return Err(MediaError::EmptyRange);
            }
        }
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        tokio::fs::create_dir_all(output_dir).await?;

        let preferred = self.capabilities.preferred_hwaccel();
        let decode_result = self
            .run_decode(video_path, start_sec, end_sec, sampling_fps, output_dir, preferred)
            .await;

        if let Err(err) = decode_result {
            if preferred == HwAccel::None {
                return Err(err);
            }
            warn!(?err, "hardware decode failed, retrying with software decode");
            self.run_decode(video_path, start_sec, end_sec, sampling_fps, output_dir, HwAccel::None)
                .await?;
        }

        self.load_frames(output_dir, sampling_fps).await
    }

    async fn run_decode(
        &self,
        video_path: &Path,
        start_sec: Option<f64>,
        end_sec: Option<f64>,
        sampling_fps: f64,
        output_dir: &Path,
        hwaccel: HwAccel,
    ) -> MediaResult<()> {
        let pattern = output_dir.join("frame_%06d.png");
        let mut cmd = FfmpegCommand::new(video_path, pattern);
        if hwaccel != HwAccel::None {
            cmd = cmd.input_arg("-hwaccel").input_arg(hwaccel.as_ffmpeg_name());
        }
        if let Some(start) = start_sec {
            cmd = cmd.seek(start);
        }
        if let (Some(start), Some(end)) = (start_sec, end_sec) {
            cmd = cmd.duration(end - start);
        }
        cmd = cmd.video_filter(format!("fps={sampling_fps}"));

        let mut runner = FfmpegRunner::new();
        if let Some(rx) = &self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }
        runner.run(&cmd).await
    }

    /// Sweep the output directory in checkpointed batches, decoding each
    /// PNG into an RGB [`Frame`]. Frames are consumed in strictly increasing
    /// index order (§5 ordering guarantee).
    async fn load_frames(&self, output_dir: &Path, sampling_fps: f64) -> MediaResult<Vec<Frame>> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(output_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "png").unwrap_or(false))
            .collect();
        entries.sort();

        let mut frames = Vec::with_capacity(entries.len().min(BACKPRESSURE_CAP));
        for (index, path) in entries.into_iter().enumerate() {
            if index % CHECKPOINT_INTERVAL == 0 && self.is_cancelled() {
                return Err(MediaError::Cancelled);
            }
            let img = image::open(&path)
                .map_err(|e| MediaError::ffmpeg_failed(e.to_string(), None, None))?
                .to_rgb8();
            let (width, height) = img.dimensions();
            frames.push(Frame::new(
                index as u64,
                index as f64 / sampling_fps,
                width,
                height,
                img.into_raw(),
            ));
        }
        Ok(frames)
    }

    /// Single-frame preview variant, used by the ROI chooser. Selects the
    /// nearest key frame at or before `at_sec` and retries at `at=0` on
    /// failure.
    pub async fn extract_preview(&self, video_path: &Path, at_sec: f64) -> MediaResult<Frame> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        match self.extract_preview_at(video_path, at_sec).await {
            Ok(frame) => Ok(frame),
            Err(_) if at_sec != 0.0 => self.extract_preview_at(video_path, 0.0).await,
            Err(err) => Err(err),
        }
    }

    async fn extract_preview_at(&self, video_path: &Path, at_sec: f64) -> MediaResult<Frame> {
        let tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(MediaError::Io)?;
        let out_path = tmp.path().to_path_buf();

        let cmd = FfmpegCommand::new(video_path, &out_path)
            .seek(at_sec.max(0.0))
            .single_frame();
        FfmpegRunner::new().run(&cmd).await?;

        let img = image::open(&out_path)
            .map_err(|e| MediaError::ffmpeg_failed(e.to_string(), None, None))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        Ok(Frame::new(0, at_sec, width, height, img.into_raw()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_empty_range() {
        let source = FrameSource::new(Arc::new(Capabilities::none()));
        let result = source
            .extract(Path::new("/dev/null"), Some(5.0), Some(5.0), 1.0, Path::new("/tmp"))
            .await;
        assert!(matches!(result, Err(MediaError::EmptyRange)));
    }

    #[tokio::test]
    async fn rejects_inverted_range() {
        let source = FrameSource::new(Arc::new(Capabilities::none()));
        let result = source
            .extract(Path::new("/dev/null"), Some(10.0), Some(2.0), 1.0, Path::new("/tmp"))
            .await;
        assert!(matches!(result, Err(MediaError::EmptyRange)));
    }
}
