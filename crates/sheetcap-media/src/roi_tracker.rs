//! C2 `RoiTracker`: stabilize a user-anchored quadrilateral across frames
//! and flag page-turn / low-confidence events.
//!
//! The user-supplied quad is ground truth (§4.2 rationale); this tracker
//! never invents content, it only follows small camera jitter and detects
//! when the page in view has changed so `Dedup` doesn't collapse a real
//! page turn. Motion is estimated by a single rigid-translation template
//! match of the quad's bounding-box patch between consecutive frames,
//! searched within the same 8% radius used for the rejection test.

use std::collections::VecDeque;

use image::{imageops, RgbImage};
use sheetcap_models::{Frame, LayoutHint, Point, Quadrilateral};
use tracing::warn;

/// Window size for the moving-average corner filter.
const STABILIZATION_WINDOW: usize = 5;
/// Reject a candidate whose corner moves more than this fraction of the
/// frame dimension from the filtered value.
const CORNER_REJECTION_FRACTION: f64 = 0.08;
/// Below this normalized correlation, treat the candidate as a new page.
const PAGE_TURN_CORRELATION_THRESHOLD: f64 = 0.55;
/// Consecutive `confidence_low` frames before falling back to a fixed quad.
const CONFIDENCE_LOW_FALLBACK_FRAMES: u32 = 3;
/// Side length of the downsampled patch used for template matching.
const PATCH_SIDE: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    None,
    PageTransition,
    ConfidenceLow,
}

#[derive(Debug, Clone)]
pub struct StabilizedFrame {
    pub quad: Quadrilateral,
    pub event: TrackerEvent,
}

pub struct RoiTracker {
    layout_hint: LayoutHint,
    frame_width: u32,
    frame_height: u32,
    window: VecDeque<Quadrilateral>,
    last_accepted: Quadrilateral,
    low_confidence_streak: u32,
    previous_patch: Option<Vec<u8>>,
}

impl RoiTracker {
    pub fn new(anchor: Quadrilateral, layout_hint: LayoutHint, frame_width: u32, frame_height: u32) -> Self {
        let mut window = VecDeque::with_capacity(STABILIZATION_WINDOW);
        window.push_back(anchor.clone());
        Self {
            layout_hint,
            frame_width,
            frame_height,
            window,
            last_accepted: anchor,
            low_confidence_streak: 0,
            previous_patch: None,
        }
    }

    /// Process one frame, returning the stabilized quad and event for it.
    pub fn track(&mut self, frame: &Frame) -> StabilizedFrame {
        let patch = grayscale_patch(frame, &self.last_accepted);
        let mut event = TrackerEvent::None;

        if let Some(prev_patch) = &self.previous_patch {
            let correlation = normalized_correlation(prev_patch, &patch);
            if correlation < PAGE_TURN_CORRELATION_THRESHOLD {
                event = TrackerEvent::PageTransition;
                self.window.clear();
                self.low_confidence_streak = 0;
            }
        }

        let candidate = if event == TrackerEvent::PageTransition {
            self.last_accepted.clone()
        } else {
            match &self.previous_patch {
                // Template must come from the previous frame, not from `frame`
                // itself -- a zero-shift candidate cut from `frame` around
                // `last_accepted` is otherwise byte-identical to the template
                // and SSD is trivially minimized at (0,0).
                Some(prev_patch) => translate_quad(&self.last_accepted, estimate_translation(prev_patch, frame, &self.last_accepted)),
                None => self.last_accepted.clone(),
            }
        };

        let filtered = self.filtered_quad();
        let accepted_quad = if event != TrackerEvent::PageTransition && self.corner_delta_exceeds(&candidate, &filtered) {
            event = TrackerEvent::ConfidenceLow;
            self.low_confidence_streak += 1;
            self.last_accepted.clone()
        } else {
            self.low_confidence_streak = 0;
            self.push_window(candidate.clone());
            candidate
        };

        self.last_accepted = accepted_quad.clone();
        self.previous_patch = Some(patch);

        let final_quad = if self.low_confidence_streak > CONFIDENCE_LOW_FALLBACK_FRAMES {
            warn!(
                streak = self.low_confidence_streak,
                "confidence low for too many consecutive frames, falling back to fixed region"
            );
            self.fallback_quad()
        } else {
            accepted_quad
        };

        StabilizedFrame {
            quad: final_quad,
            event,
        }
    }

    fn filtered_quad(&self) -> Quadrilateral {
        let n = self.window.len().max(1) as f64;
        let mut sum = [Point { x: 0.0, y: 0.0 }; 4];
        for q in &self.window {
            for (i, corner) in q.corners().into_iter().enumerate() {
                sum[i].x += corner.x;
                sum[i].y += corner.y;
            }
        }
        Quadrilateral {
            top_left: Point { x: sum[0].x / n, y: sum[0].y / n },
            top_right: Point { x: sum[1].x / n, y: sum[1].y / n },
            bottom_right: Point { x: sum[2].x / n, y: sum[2].y / n },
            bottom_left: Point { x: sum[3].x / n, y: sum[3].y / n },
        }
    }

    fn push_window(&mut self, quad: Quadrilateral) {
        if self.window.len() == STABILIZATION_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(quad);
    }

    fn corner_delta_exceeds(&self, candidate: &Quadrilateral, filtered: &Quadrilateral) -> bool {
        let threshold = CORNER_REJECTION_FRACTION * self.frame_width.max(self.frame_height) as f64;
        candidate
            .corners()
            .into_iter()
            .zip(filtered.corners())
            .any(|(c, f)| c.distance_to(&f) > threshold)
    }

    fn fallback_quad(&self) -> Quadrilateral {
        let w = self.frame_width as f64;
        let h = self.frame_height as f64;
        match self.layout_hint {
            LayoutHint::BottomBar => Quadrilateral {
                top_left: Point { x: 0.0, y: h * 0.7 },
                top_right: Point { x: w, y: h * 0.7 },
                bottom_right: Point { x: w, y: h },
                bottom_left: Point { x: 0.0, y: h },
            },
            _ => Quadrilateral {
                top_left: Point { x: w * 0.1, y: h * 0.1 },
                top_right: Point { x: w * 0.9, y: h * 0.1 },
                bottom_right: Point { x: w * 0.9, y: h * 0.9 },
                bottom_left: Point { x: w * 0.1, y: h * 0.9 },
            },
        }
    }
}

fn bbox_of(quad: &Quadrilateral) -> (i64, i64, u32, u32) {
    let corners = quad.corners();
    let min_x = corners.iter().map(|p| p.x).fold(f64::MAX, f64::min);
    let max_x = corners.iter().map(|p| p.x).fold(f64::MIN, f64::max);
    let min_y = corners.iter().map(|p| p.y).fold(f64::MAX, f64::min);
    let max_y = corners.iter().map(|p| p.y).fold(f64::MIN, f64::max);
    (
        min_x.max(0.0) as i64,
        min_y.max(0.0) as i64,
        (max_x - min_x).max(1.0) as u32,
        (max_y - min_y).max(1.0) as u32,
    )
}

fn grayscale_patch(frame: &Frame, quad: &Quadrilateral) -> Vec<u8> {
    let (x, y, w, h) = bbox_of(quad);
    let img = match RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone()) {
        Some(img) => img,
        None => return vec![0; (PATCH_SIDE * PATCH_SIDE) as usize],
    };
    let x = (x as u32).min(frame.width.saturating_sub(1));
    let y = (y as u32).min(frame.height.saturating_sub(1));
    let w = w.min(frame.width - x).max(1);
    let h = h.min(frame.height - y).max(1);
    let cropped = imageops::crop_imm(&img, x, y, w, h).to_image();
    let resized = imageops::resize(&cropped, PATCH_SIDE, PATCH_SIDE, imageops::FilterType::Triangle);
    resized
        .pixels()
        .map(|p| ((p[0] as u32 + p[1] as u32 + p[2] as u32) / 3) as u8)
        .collect()
}

pub(crate) fn normalized_correlation(a: &[u8], b: &[u8]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&pa, &pb) in a.iter().zip(b) {
        let da = pa as f64 - mean_a;
        let db = pb as f64 - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return if var_a.abs() < f64::EPSILON && var_b.abs() < f64::EPSILON { 1.0 } else { 0.0 };
    }
    (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0)
}

/// Search a small translation window around the previous quad position for
/// the offset minimizing SSD against `patch`, the template cut from the
/// previous frame. Candidates are cut from the current `frame`. Returns an
/// (dx, dy) pixel offset.
fn estimate_translation(patch: &[u8], frame: &Frame, around: &Quadrilateral) -> (f64, f64) {
    let (x, y, w, h) = bbox_of(around);
    let search_radius = (CORNER_REJECTION_FRACTION * frame.width.max(frame.height) as f64) as i64;
    let step = (search_radius / 4).max(1);

    let mut best = (0i64, 0i64);
    let mut best_score = f64::MAX;
    let mut dy = -search_radius;
    while dy <= search_radius {
        let mut dx = -search_radius;
        while dx <= search_radius {
            let cand_x = x + dx;
            let cand_y = y + dy;
            if cand_x >= 0 && cand_y >= 0 {
                let shifted = Quadrilateral {
                    top_left: Point { x: cand_x as f64, y: cand_y as f64 },
                    top_right: Point { x: (cand_x + w as i64) as f64, y: cand_y as f64 },
                    bottom_right: Point { x: (cand_x + w as i64) as f64, y: (cand_y + h as i64) as f64 },
                    bottom_left: Point { x: cand_x as f64, y: (cand_y + h as i64) as f64 },
                };
                let candidate_patch = grayscale_patch(frame, &shifted);
                let ssd: f64 = patch
                    .iter()
                    .zip(candidate_patch.iter())
                    .map(|(&a, &b)| (a as f64 - b as f64).powi(2))
                    .sum();
                if ssd < best_score {
                    best_score = ssd;
                    best = (dx, dy);
                }
            }
            dx += step;
        }
        dy += step;
    }
    (best.0 as f64, best.1 as f64)
}

fn translate_quad(quad: &Quadrilateral, (dx, dy): (f64, f64)) -> Quadrilateral {
    let shift = |p: &Point| Point { x: p.x + dx, y: p.y + dy };
    Quadrilateral {
        top_left: shift(&quad.top_left),
        top_right: shift(&quad.top_right),
        bottom_right: shift(&quad.bottom_right),
        bottom_left: shift(&quad.bottom_left),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(index: u64, width: u32, height: u32, value: u8) -> Frame {
        Frame::new(index, index as f64, width, height, vec![value; (width * height * 3) as usize])
    }

    fn full_frame_quad(w: u32, h: u32) -> Quadrilateral {
        Quadrilateral {
            top_left: Point { x: 0.0, y: 0.0 },
            top_right: Point { x: w as f64, y: 0.0 },
            bottom_right: Point { x: w as f64, y: h as f64 },
            bottom_left: Point { x: 0.0, y: h as f64 },
        }
    }

    #[test]
    fn identical_frames_never_signal_page_transition() {
        let quad = full_frame_quad(200, 150);
        let mut tracker = RoiTracker::new(quad, LayoutHint::FullScroll, 200, 150);
        for i in 0..5 {
            let frame = flat_frame(i, 200, 150, 128);
            let result = tracker.track(&frame);
            assert_eq!(result.event, TrackerEvent::None);
        }
    }

    #[test]
    fn large_content_change_signals_page_transition() {
        let quad = full_frame_quad(200, 150);
        let mut tracker = RoiTracker::new(quad, LayoutHint::FullScroll, 200, 150);
        let dark = flat_frame(0, 200, 150, 10);
        tracker.track(&dark);
        let bright = flat_frame(1, 200, 150, 250);
        let result = tracker.track(&bright);
        assert_eq!(result.event, TrackerEvent::PageTransition);
    }

    #[test]
    fn fallback_quad_matches_layout_hint() {
        let quad = full_frame_quad(200, 150);
        let tracker = RoiTracker::new(quad, LayoutHint::BottomBar, 200, 150);
        let fallback = tracker.fallback_quad();
        assert!(fallback.top_left.y > 100.0);
    }
}
