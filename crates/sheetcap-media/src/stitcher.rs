//! C5 `Stitcher`: scroll-mode vertical strip assembly by row-profile
//! correlation, or page-mode clustering by perceptual hash.

use image::RgbImage;
use sheetcap_models::{PageCandidate, PageOrigin, RectifiedCapture, Sensitivity};

use crate::error::{MediaError, MediaResult};
use crate::rectifier::luma;
use crate::roi_tracker::normalized_correlation;

/// Reject an alignment whose correlation peak falls below this (§4.5).
const CORRELATION_REJECTION_THRESHOLD: f64 = 0.35;

pub struct Stitcher {
    overlap_fraction: f64,
    dedupe_level: Sensitivity,
}

impl Stitcher {
    pub fn new(overlap_fraction: f64, dedupe_level: Sensitivity) -> Self {
        Self {
            overlap_fraction: overlap_fraction.clamp(0.01, 0.9),
            dedupe_level,
        }
    }

    /// Build one or more vertical strips from an ordered capture sequence.
    /// No pixel row of any strip is ever written twice (§4.5 guarantee).
    pub fn stitch_scroll(&self, captures: &[RectifiedCapture]) -> MediaResult<Vec<PageCandidate>> {
        let mut strips = Vec::new();
        let mut current: Option<StripBuilder> = None;

        for capture in captures {
            let image = RgbImage::from_raw(capture.width, capture.height, capture.pixels.clone())
                .ok_or_else(|| MediaError::internal("capture buffer dimensions do not match pixel count"))?;

            current = match current.take() {
                None => Some(StripBuilder::new(capture.source_frame_index, image)),
                Some(mut strip) => {
                    if strip.try_append(capture.source_frame_index, &image, self.overlap_fraction) {
                        Some(strip)
                    } else {
                        strips.push(strip.finish());
                        Some(StripBuilder::new(capture.source_frame_index, image))
                    }
                }
            };
        }
        if let Some(strip) = current {
            strips.push(strip.finish());
        }
        Ok(strips)
    }

    /// Cluster captures by perceptual hash (§4.4's table) and emit the
    /// member with the largest content bounding box per cluster, in the
    /// order clusters were first seen.
    pub fn cluster_pages(&self, captures: &[RectifiedCapture]) -> Vec<PageCandidate> {
        let threshold = self.dedupe_level.dedupe_threshold();
        let mut clusters: Vec<Vec<&RectifiedCapture>> = Vec::new();

        'outer: for capture in captures {
            for cluster in clusters.iter_mut() {
                if cluster[0].hash.hamming_distance(&capture.hash) <= threshold {
                    cluster.push(capture);
                    continue 'outer;
                }
            }
            clusters.push(vec![capture]);
        }

        clusters
            .into_iter()
            .enumerate()
            .map(|(cluster_id, members)| {
                let canonical = members
                    .iter()
                    .max_by_key(|c| c.content_bbox.area())
                    .expect("cluster always has at least one member");
                PageCandidate::new(
                    PageOrigin::Cluster {
                        page_cluster_id: cluster_id as u32,
                        frame_index: canonical.source_frame_index,
                    },
                    canonical.width,
                    canonical.height,
                    canonical.pixels.clone(),
                )
            })
            .collect()
    }
}

struct StripBuilder {
    width: u32,
    rows: Vec<u8>,
    frame_indices: Vec<u64>,
}

impl StripBuilder {
    fn new(frame_index: u64, image: RgbImage) -> Self {
        let width = image.width();
        Self {
            width,
            rows: image.into_raw(),
            frame_indices: vec![frame_index],
        }
    }

    fn height(&self) -> u32 {
        (self.rows.len() / (self.width as usize * 3)) as u32
    }

    /// Try to align `image`'s top against this strip's current bottom band
    /// and append the non-overlapping remainder. Returns `false` (and
    /// leaves `self` untouched) if no offset in the search band clears the
    /// correlation threshold -- caller should start a new strip.
    fn try_append(&mut self, frame_index: u64, image: &RgbImage, overlap_fraction: f64) -> bool {
        if image.width() != self.width {
            return false;
        }
        let band = ((image.height() as f64 * overlap_fraction).round() as u32).clamp(1, image.height());
        let strip_height = self.height();
        let tail_rows = band.min(strip_height);

        let tail_profile = row_profile_from_raw(&self.rows, self.width, strip_height - tail_rows, strip_height);

        let mut best_overlap = 0u32;
        let mut best_score = f64::MIN;
        for overlap in 1..=band.min(image.height()) {
            let head_profile = row_profile(image, 0, overlap);
            let compare_len = tail_profile.len().min(head_profile.len());
            if compare_len == 0 {
                continue;
            }
            let score = normalized_correlation(
                &to_u8_profile(&tail_profile[tail_profile.len() - compare_len..]),
                &to_u8_profile(&head_profile[head_profile.len() - compare_len..]),
            );
            if score >= best_score {
                best_score = score;
                best_overlap = overlap;
            }
        }

        if best_score < CORRELATION_REJECTION_THRESHOLD {
            return false;
        }

        let append_from = best_overlap.min(image.height());
        let (w, h) = image.dimensions();
        for y in append_from..h {
            for x in 0..w {
                let pixel = image.get_pixel(x, y);
                self.rows.extend_from_slice(&pixel.0);
            }
        }
        self.frame_indices.push(frame_index);
        true
    }

    fn finish(self) -> PageCandidate {
        let height = self.height();
        PageCandidate::new(
            PageOrigin::Stitched { frame_indices: self.frame_indices },
            self.width,
            height,
            self.rows,
        )
    }
}

fn row_profile(image: &RgbImage, from_row: u32, count: u32) -> Vec<f64> {
    let w = image.width();
    (from_row..(from_row + count).min(image.height()))
        .map(|y| {
            let sum: u32 = (0..w).map(|x| luma(image.get_pixel(x, y)) as u32).sum();
            sum as f64 / w.max(1) as f64
        })
        .collect()
}

fn row_profile_from_raw(rows: &[u8], width: u32, from_row: u32, to_row: u32) -> Vec<f64> {
    let mut out = Vec::new();
    for y in from_row..to_row {
        let start = (y as usize) * (width as usize) * 3;
        let end = start + (width as usize) * 3;
        if end > rows.len() {
            break;
        }
        let row = &rows[start..end];
        let sum: u32 = row.chunks_exact(3).map(|px| luma(&image::Rgb([px[0], px[1], px[2]])) as u32).sum();
        out.push(sum as f64 / width.max(1) as f64);
    }
    out
}

fn to_u8_profile(values: &[f64]) -> Vec<u8> {
    values.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_capture(index: u64, hash: u64, width: u32, height: u32, value: u8) -> RectifiedCapture {
        use sheetcap_models::{BoundingBox, PerceptualHash};
        RectifiedCapture::new(
            index,
            PerceptualHash(hash),
            BoundingBox { x: 0, y: 0, width, height },
            width,
            height,
            vec![value; (width * height * 3) as usize],
        )
    }

    #[test]
    fn identical_captures_merge_into_one_strip() {
        let stitcher = Stitcher::new(0.5, Sensitivity::Normal);
        let captures = vec![
            flat_capture(0, 0, 20, 40, 200),
            flat_capture(1, 0, 20, 40, 200),
        ];
        let strips = stitcher.stitch_scroll(&captures).unwrap();
        assert_eq!(strips.len(), 1);
    }

    #[test]
    fn strip_height_never_exceeds_sum_of_inputs() {
        let stitcher = Stitcher::new(0.2, Sensitivity::Normal);
        let captures = vec![
            flat_capture(0, 0, 20, 40, 50),
            flat_capture(1, 0, 20, 40, 200),
            flat_capture(2, 0, 20, 40, 90),
        ];
        let strips = stitcher.stitch_scroll(&captures).unwrap();
        let total_height: u32 = strips.iter().map(|p| p.height).sum();
        assert!(total_height <= 120);
    }

    #[test]
    fn cluster_pages_picks_largest_bbox_as_canonical() {
        use sheetcap_models::BoundingBox;
        let stitcher = Stitcher::new(0.2, Sensitivity::Normal);
        let mut small = flat_capture(0, 0, 10, 10, 100);
        small.content_bbox = BoundingBox { x: 0, y: 0, width: 2, height: 2 };
        let mut large = flat_capture(1, 0, 10, 10, 100);
        large.content_bbox = BoundingBox { x: 0, y: 0, width: 8, height: 8 };
        let pages = stitcher.cluster_pages(&[small, large]);
        assert_eq!(pages.len(), 1);
        assert!(matches!(pages[0].origin, PageOrigin::Cluster { frame_index: 1, .. }));
    }
}
