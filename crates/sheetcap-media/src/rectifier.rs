//! C3 `Rectifier`: warp each ROI into a canonical rectangle and normalize
//! background tone.

use image::{Rgb, RgbImage};
use sheetcap_models::{BoundingBox, Frame, Quadrilateral, RectifiedCapture};

use crate::error::{MediaError, MediaResult};
use crate::homography::Homography;
use crate::phash::compute_phash;

/// Shorter side of the rectified target, before clamping (§4.3).
const TARGET_SHORT_SIDE: f64 = 1200.0;
const MIN_TARGET_DIM: f64 = 800.0;
const MAX_TARGET_DIM: f64 = 2000.0;
/// Background is shifted so its histogram mode lands near-white.
const BACKGROUND_TARGET_LUMA: f64 = 245.0;
const BACKGROUND_SAMPLE_FRACTION: f64 = 0.05;
/// Below this luminance a pixel counts as ink for the content bounding box.
pub(crate) const INK_LUMA_THRESHOLD: u8 = 200;

#[derive(Debug, Default)]
pub struct Rectifier;

impl Rectifier {
    pub fn new() -> Self {
        Self
    }

    pub fn rectify(&self, frame: &Frame, quad: &Quadrilateral) -> MediaResult<RectifiedCapture> {
        let (target_w, target_h) = target_dimensions(quad);
        let warped = warp(frame, quad, target_w, target_h)?;
        let normalized = normalize_background(warped);
        let content_bbox = content_bounding_box(&normalized);
        let hash = compute_phash(&normalized);
        Ok(RectifiedCapture::new(
            frame.index,
            hash,
            content_bbox,
            target_w,
            target_h,
            normalized.into_raw(),
        ))
    }
}

/// The shorter side of the quad maps to 1200px (clamped [800,2000]); the
/// other side is derived from the quad's own aspect ratio and clamped the
/// same way so extreme ROIs don't produce unbounded targets.
fn target_dimensions(quad: &Quadrilateral) -> (u32, u32) {
    let corners = quad.corners();
    let width = (corners[0].distance_to(&corners[1]) + corners[3].distance_to(&corners[2])) / 2.0;
    let height = (corners[0].distance_to(&corners[3]) + corners[1].distance_to(&corners[2])) / 2.0;
    let (short, long, portrait) = if width <= height {
        (width, height, true)
    } else {
        (height, width, false)
    };
    let aspect = (long / short.max(1e-6)).max(1.0);
    let short_side = TARGET_SHORT_SIDE.clamp(MIN_TARGET_DIM, MAX_TARGET_DIM);
    let long_side = (short_side * aspect).clamp(MIN_TARGET_DIM, MAX_TARGET_DIM);
    if portrait {
        (short_side.round() as u32, long_side.round() as u32)
    } else {
        (long_side.round() as u32, short_side.round() as u32)
    }
}

fn warp(frame: &Frame, quad: &Quadrilateral, target_w: u32, target_h: u32) -> MediaResult<RgbImage> {
    let source = RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone())
        .ok_or_else(|| MediaError::internal("frame buffer dimensions do not match pixel count"))?;

    let dest_corners = [
        (0.0, 0.0),
        (target_w as f64, 0.0),
        (target_w as f64, target_h as f64),
        (0.0, target_h as f64),
    ];
    let src_corners = {
        let c = quad.corners();
        [(c[0].x, c[0].y), (c[1].x, c[1].y), (c[2].x, c[2].y), (c[3].x, c[3].y)]
    };
    let homography = Homography::solve(dest_corners, src_corners);

    let mut out = RgbImage::new(target_w, target_h);
    for y in 0..target_h {
        for x in 0..target_w {
            let (u, v) = homography.apply(x as f64, y as f64);
            out.put_pixel(x, y, sample_bilinear(&source, u, v));
        }
    }
    Ok(out)
}

fn sample_bilinear(source: &RgbImage, u: f64, v: f64) -> Rgb<u8> {
    let (w, h) = source.dimensions();
    if w < 2 || h < 2 || u < 0.0 || v < 0.0 || u >= (w - 1) as f64 || v >= (h - 1) as f64 {
        return Rgb([255, 255, 255]);
    }
    let x0 = u.floor() as u32;
    let y0 = v.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = u - x0 as f64;
    let fy = v - y0 as f64;

    let p00 = source.get_pixel(x0, y0).0;
    let p10 = source.get_pixel(x1, y0).0;
    let p01 = source.get_pixel(x0, y1).0;
    let p11 = source.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

pub(crate) fn luma(p: &Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Shift luminance uniformly so the mode of the top/bottom 5% rows lands
/// near-white, preserving ink strokes relative to the new background.
fn normalize_background(mut image: RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let band = ((h as f64 * BACKGROUND_SAMPLE_FRACTION).ceil() as u32).max(1).min(h);

    let mut histogram = [0u32; 256];
    for y in 0..band {
        for x in 0..w {
            histogram[luma(image.get_pixel(x, y)) as usize] += 1;
        }
    }
    for y in h.saturating_sub(band)..h {
        for x in 0..w {
            histogram[luma(image.get_pixel(x, y)) as usize] += 1;
        }
    }
    let mode = histogram
        .iter()
        .enumerate()
        .max_by_key(|&(_, count)| *count)
        .map(|(value, _)| value as f64)
        .unwrap_or(BACKGROUND_TARGET_LUMA);
    let shift = BACKGROUND_TARGET_LUMA - mode;

    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (*channel as f64 + shift).round().clamp(0.0, 255.0) as u8;
        }
    }
    image
}

pub(crate) fn content_bounding_box(image: &RgbImage) -> BoundingBox {
    let (w, h) = image.dimensions();
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (w, 0u32, h, 0u32);
    let mut found = false;

    for y in 0..h {
        for x in 0..w {
            if luma(image.get_pixel(x, y)) < INK_LUMA_THRESHOLD {
                found = true;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
    }

    if !found {
        BoundingBox { x: 0, y: 0, width: w, height: h }
    } else {
        BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcap_models::Point;

    fn full_frame_quad(w: f64, h: f64) -> Quadrilateral {
        Quadrilateral::new(
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        )
    }

    #[test]
    fn rectify_produces_clamped_target_dimensions() {
        let frame = Frame::new(0, 0.0, 400, 300, vec![230u8; 400 * 300 * 3]);
        let quad = full_frame_quad(400.0, 300.0);
        let rectifier = Rectifier::new();
        let capture = rectifier.rectify(&frame, &quad).unwrap();
        assert!(capture.width >= 800 && capture.width <= 2000);
        assert!(capture.height >= 800 && capture.height <= 2000);
    }

    #[test]
    fn uniform_background_normalizes_near_white() {
        let frame = Frame::new(0, 0.0, 100, 100, vec![100u8; 100 * 100 * 3]);
        let quad = full_frame_quad(100.0, 100.0);
        let rectifier = Rectifier::new();
        let capture = rectifier.rectify(&frame, &quad).unwrap();
        assert!(capture.pixels[0] > 230);
    }
}
