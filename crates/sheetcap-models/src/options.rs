//! Tagged-record option structs for each pipeline stage (§4.8, §9 Design
//! Note "Dynamic option bags -> enumerated option structs").

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::geometry::Quadrilateral;

/// Discrete dedupe/extraction aggressiveness. The mapping to numeric
/// thresholds is fixed, not continuous (§4.1, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Aggressive,
    #[default]
    Normal,
    Sensitive,
}

impl Sensitivity {
    /// `sampling_fps`: `low=0.6, medium=1.0, high=1.8`. This is the same
    /// aggressive/normal/sensitive axis the dedupe threshold table uses --
    /// "aggressive" is the "low" UI setting, "sensitive" is "high".
    pub fn sampling_fps(&self) -> f64 {
        match self {
            Sensitivity::Aggressive => 0.6,
            Sensitivity::Normal => 1.0,
            Sensitivity::Sensitive => 1.8,
        }
    }

    /// Hamming-distance dedupe threshold (§4.4).
    pub fn dedupe_threshold(&self) -> u32 {
        match self {
            Sensitivity::Aggressive => 18,
            Sensitivity::Normal => 12,
            Sensitivity::Sensitive => 6,
        }
    }
}

/// How the ROI should be interpreted across frames (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LayoutHint {
    /// Fixed region near the bottom of frame, e.g. a scrolling bottom bar.
    BottomBar,
    /// Continuously scrolling sheet music filling most of the frame.
    FullScroll,
    /// Discrete static pages separated by hard transitions.
    PageTurn,
}

impl LayoutHint {
    /// Infer the default hint from the anchor quad's aspect ratio, absent an
    /// explicit user choice of `PageTurn` (§4.2).
    pub fn infer_from_aspect_ratio(aspect_ratio: f64) -> Self {
        if aspect_ratio >= 2.25 {
            LayoutHint::BottomBar
        } else {
            LayoutHint::FullScroll
        }
    }

    pub fn is_page_mode(&self) -> bool {
        matches!(self, LayoutHint::PageTurn | LayoutHint::BottomBar)
    }
}

/// Upscale backend family, used both for the `DRUMSHEET_UPSCALE_ENGINE`
/// override and the `runtime.upscale_engine_hint` manifest field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UpscaleFactor {
    Two,
    Three,
}

impl UpscaleFactor {
    pub fn as_f64(&self) -> f64 {
        match self {
            UpscaleFactor::Two => 2.0,
            UpscaleFactor::Three => 3.0,
        }
    }
}

/// Output image format for `PageComposer::compose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Png,
    Jpg,
    Pdf,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractOptions {
    pub sampling_fps: f64,
    pub sensitivity: Sensitivity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_sec: Option<f64>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        let sensitivity = Sensitivity::default();
        Self {
            sampling_fps: sensitivity.sampling_fps(),
            sensitivity,
            start_sec: None,
            end_sec: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectOptions {
    pub roi: Quadrilateral,
    pub layout_hint: LayoutHint,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StitchOptions {
    pub enable: bool,
    pub overlap_threshold: f64,
    pub layout_hint: LayoutHint,
    pub dedupe_level: Sensitivity,
}

impl StitchOptions {
    pub fn with_layout_hint(layout_hint: LayoutHint) -> Self {
        Self {
            enable: true,
            overlap_threshold: 0.20,
            layout_hint,
            dedupe_level: Sensitivity::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpscaleOptions {
    pub enable: bool,
    pub factor: UpscaleFactor,
    pub gpu_only: bool,
}

impl Default for UpscaleOptions {
    fn default() -> Self {
        Self { enable: false, factor: UpscaleFactor::Two, gpu_only: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportOptions {
    pub formats: Vec<ExportFormat>,
    pub include_raw_frames: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { formats: vec![ExportFormat::Png, ExportFormat::Pdf], include_raw_frames: false }
    }
}

/// The full set of per-stage options carried by a `Job`. `detect` has no
/// default since the ROI must always come from the caller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineOptions {
    pub extract: ExtractOptions,
    pub detect: DetectOptions,
    pub stitch: StitchOptions,
    pub upscale: UpscaleOptions,
    pub export: ExportOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        use crate::geometry::Point;
        let roi = Quadrilateral::new(
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        );
        Self {
            extract: ExtractOptions::default(),
            detect: DetectOptions { roi, layout_hint: LayoutHint::FullScroll },
            stitch: StitchOptions::with_layout_hint(LayoutHint::FullScroll),
            upscale: UpscaleOptions::default(),
            export: ExportOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitivity_maps_to_fixed_thresholds() {
        assert_eq!(Sensitivity::Aggressive.dedupe_threshold(), 18);
        assert_eq!(Sensitivity::Normal.dedupe_threshold(), 12);
        assert_eq!(Sensitivity::Sensitive.dedupe_threshold(), 6);
    }

    #[test]
    fn layout_hint_infers_bottom_bar_above_threshold() {
        assert_eq!(LayoutHint::infer_from_aspect_ratio(2.3), LayoutHint::BottomBar);
        assert_eq!(LayoutHint::infer_from_aspect_ratio(1.5), LayoutHint::FullScroll);
    }
}
