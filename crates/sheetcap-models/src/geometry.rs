//! Quadrilateral ROI geometry in source-frame pixel coordinates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Four points in source-frame pixel coordinates, ordered TL, TR, BR, BL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Quadrilateral {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

/// Minimum ROI area as a fraction of the source frame area before it is
/// rejected as "too small" (`input_invalid`, §8 boundary case).
pub const MIN_ROI_AREA_FRACTION: f64 = 0.01;

impl Quadrilateral {
    pub fn new(top_left: Point, top_right: Point, bottom_right: Point, bottom_left: Point) -> Self {
        Self { top_left, top_right, bottom_right, bottom_left }
    }

    pub fn corners(&self) -> [Point; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    /// Shoelace-formula area of the quad, in pixels^2.
    pub fn area(&self) -> f64 {
        let pts = self.corners();
        let mut sum = 0.0;
        for i in 0..4 {
            let p = pts[i];
            let q = pts[(i + 1) % 4];
            sum += p.x * q.y - q.x * p.y;
        }
        (sum / 2.0).abs()
    }

    /// Every corner must lie inside `[0,W]x[0,H]` and the area must clear
    /// `MIN_ROI_AREA_FRACTION` of the frame area.
    pub fn is_valid_for_frame(&self, frame_width: u32, frame_height: u32) -> bool {
        let w = frame_width as f64;
        let h = frame_height as f64;
        let in_bounds = self
            .corners()
            .iter()
            .all(|p| p.x >= 0.0 && p.x <= w && p.y >= 0.0 && p.y <= h);
        if !in_bounds {
            return false;
        }
        let frame_area = w * h;
        frame_area > 0.0 && self.area() >= MIN_ROI_AREA_FRACTION * frame_area
    }

    /// Aspect ratio of the quad's bounding box, used to infer the default
    /// `LayoutHint` (`>= 2.25` => `BottomBar`).
    pub fn aspect_ratio(&self) -> f64 {
        let pts = self.corners();
        let min_x = pts.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = pts.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = pts.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = pts.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        let width = (max_x - min_x).max(1e-6);
        let height = (max_y - min_y).max(1e-6);
        width / height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_frame_quad(w: f64, h: f64) -> Quadrilateral {
        Quadrilateral::new(
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        )
    }

    #[test]
    fn full_frame_area_matches_frame() {
        let quad = full_frame_quad(1000.0, 500.0);
        assert!((quad.area() - 500_000.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_tiny_roi() {
        let quad = Quadrilateral::new(
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(5.0, 5.0),
            Point::new(0.0, 5.0),
        );
        assert!(!quad.is_valid_for_frame(1000, 1000));
    }

    #[test]
    fn rejects_out_of_bounds_corner() {
        let mut quad = full_frame_quad(100.0, 100.0);
        quad.top_right.x = 200.0;
        assert!(!quad.is_valid_for_frame(100, 100));
    }

    #[test]
    fn bottom_bar_aspect_ratio_threshold() {
        let wide = Quadrilateral::new(
            Point::new(0.0, 0.0),
            Point::new(900.0, 0.0),
            Point::new(900.0, 100.0),
            Point::new(0.0, 100.0),
        );
        assert!(wide.aspect_ratio() >= 2.25);
    }
}
