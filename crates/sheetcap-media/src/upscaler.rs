//! C6 `Upscaler`: enlarge a page using the first available backend, failing
//! closed when `gpu_only` is set and none self-tested successfully.

use std::sync::Arc;

use image::{imageops, Rgb, RgbImage};
use sheetcap_models::{PageCandidate, UpscaleFactor};
use tracing::info;

use crate::capabilities::{Capabilities, UpscaleBackend};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

const UNSHARP_RADIUS: f32 = 1.2;
const UNSHARP_AMOUNT: f32 = 0.6;

pub struct Upscaler {
    capabilities: Arc<Capabilities>,
    sharpen_enabled: bool,
}

impl Upscaler {
    pub fn new(capabilities: Arc<Capabilities>) -> Self {
        Self {
            capabilities,
            sharpen_enabled: true,
        }
    }

    /// `DRUMSHEET_UPSCALE_SHARPEN=0` disables the post-resize unsharp mask.
    pub fn with_sharpen(mut self, enabled: bool) -> Self {
        self.sharpen_enabled = enabled;
        self
    }

    pub async fn upscale(&self, page: PageCandidate, factor: UpscaleFactor, gpu_only: bool) -> MediaResult<PageCandidate> {
        match self.capabilities.preferred_upscale_backend() {
            Some(backend) => self.run_backend(backend, page, factor).await,
            None if gpu_only => Err(MediaError::NoGpuUpscale),
            None => {
                info!("upscaling skipped, no backend available and gpu_only not set");
                Ok(page)
            }
        }
    }

    async fn run_backend(&self, backend: UpscaleBackend, page: PageCandidate, factor: UpscaleFactor) -> MediaResult<PageCandidate> {
        match backend {
            UpscaleBackend::ScaleVt => self.run_scale_vt(page, factor).await,
            other => Err(MediaError::UpscaleFailed(format!(
                "{} backend is not implemented in this build",
                other.as_str()
            ))),
        }
    }

    async fn run_scale_vt(&self, page: PageCandidate, factor: UpscaleFactor) -> MediaResult<PageCandidate> {
        let target_w = (page.width as f64 * factor.as_f64()).round() as u32;
        let target_h = (page.height as f64 * factor.as_f64()).round() as u32;

        let image = RgbImage::from_raw(page.width, page.height, page.pixels.clone())
            .ok_or_else(|| MediaError::internal("page buffer dimensions do not match pixel count"))?;

        let input_tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(MediaError::Io)?;
        let output_tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(MediaError::Io)?;
        image
            .save(input_tmp.path())
            .map_err(|e| MediaError::UpscaleFailed(e.to_string()))?;

        let filter = format!("format=nv12,hwupload,scale_vt=w={target_w}:h={target_h},hwdownload,format=nv12");
        let cmd = FfmpegCommand::new(input_tmp.path(), output_tmp.path())
            .video_filter(filter)
            .single_frame();
        FfmpegRunner::new()
            .run(&cmd)
            .await
            .map_err(|e| MediaError::UpscaleFailed(e.to_string()))?;

        let mut resized = image::open(output_tmp.path())
            .map_err(|e| MediaError::UpscaleFailed(e.to_string()))?
            .to_rgb8();
        if self.sharpen_enabled {
            resized = apply_unsharp_mask(&resized, UNSHARP_RADIUS, UNSHARP_AMOUNT);
        }
        let (w, h) = resized.dimensions();
        Ok(PageCandidate::new(page.origin, w, h, resized.into_raw()))
    }
}

/// Unsharp mask: `sharpened = original + amount * (original - blur(original, radius))`.
fn apply_unsharp_mask(image: &RgbImage, radius: f32, amount: f32) -> RgbImage {
    let blurred = imageops::blur(image, radius);
    let (w, h) = image.dimensions();
    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let orig = image.get_pixel(x, y).0;
            let blur = blurred.get_pixel(x, y).0;
            let mut px = [0u8; 3];
            for c in 0..3 {
                let sharpened = orig[c] as f32 + amount * (orig[c] as f32 - blur[c] as f32);
                px[c] = sharpened.round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(x, y, Rgb(px));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcap_models::PageOrigin;

    fn sample_page(w: u32, h: u32) -> PageCandidate {
        PageCandidate::new(PageOrigin::Stitched { frame_indices: vec![0] }, w, h, vec![200; (w * h * 3) as usize])
    }

    #[tokio::test]
    async fn gpu_only_fails_closed_with_no_backend() {
        let upscaler = Upscaler::new(Arc::new(Capabilities::none()));
        let result = upscaler.upscale(sample_page(10, 10), UpscaleFactor::Two, true).await;
        assert!(matches!(result, Err(MediaError::NoGpuUpscale)));
    }

    #[tokio::test]
    async fn skips_silently_without_gpu_only() {
        let upscaler = Upscaler::new(Arc::new(Capabilities::none()));
        let page = sample_page(10, 10);
        let result = upscaler.upscale(page, UpscaleFactor::Two, false).await.unwrap();
        assert_eq!(result.width, 10);
        assert_eq!(result.height, 10);
    }

    #[test]
    fn unsharp_mask_preserves_dimensions() {
        let img = RgbImage::from_fn(20, 20, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 100]));
        let sharpened = apply_unsharp_mask(&img, UNSHARP_RADIUS, UNSHARP_AMOUNT);
        assert_eq!(sharpened.dimensions(), img.dimensions());
    }
}
