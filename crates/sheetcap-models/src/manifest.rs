//! The published record of a job's output files and runtime metadata.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hardware/software path actually used for a job, reported for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuntimeInfo {
    pub overall_mode: String,
    pub ffmpeg_mode: String,
    pub opencv_mode: String,
    pub upscale_engine_hint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub w: u32,
    pub h: u32,
}

/// Recorded after a `review_export` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewExportInfo {
    pub kept_count: usize,
}

/// A pre-compose candidate image the user may keep, drop, or recrop in the
/// review UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewCandidate {
    pub path: PathBuf,
    /// Bumped by `CaptureEditor::crop_capture`, used as a UI cache-buster.
    pub version: u32,
}

/// Published job output. Every path here lies under the job's workspace
/// directory (§3 invariant, §8 testable property 1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    pub output_dir: PathBuf,
    pub images: Vec<PathBuf>,
    pub review_candidates: Vec<ReviewCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<PathBuf>,
    pub source_resolution: Resolution,
    pub upscaled_frames: Vec<PathBuf>,
    pub runtime: RuntimeInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_export: Option<ReviewExportInfo>,
}

impl Manifest {
    pub fn empty(workspace_dir: PathBuf) -> Self {
        Self {
            output_dir: workspace_dir,
            images: Vec::new(),
            review_candidates: Vec::new(),
            pdf: None,
            source_resolution: Resolution::default(),
            upscaled_frames: Vec::new(),
            runtime: RuntimeInfo::default(),
            review_export: None,
        }
    }

    /// §8 invariant 1: every manifest path lies under the job workspace.
    pub fn paths_under_workspace(&self) -> bool {
        let under = |p: &PathBuf| p.starts_with(&self.output_dir);
        self.images.iter().all(under)
            && self.upscaled_frames.iter().all(under)
            && self.review_candidates.iter().all(|c| under(&c.path))
            && self.pdf.as_ref().map(under).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_has_no_files() {
        let m = Manifest::empty(PathBuf::from("/jobs/abc"));
        assert!(m.images.is_empty());
        assert!(m.paths_under_workspace());
    }

    #[test]
    fn detects_path_escaping_workspace() {
        let mut m = Manifest::empty(PathBuf::from("/jobs/abc"));
        m.images.push(PathBuf::from("/jobs/other/page_001.png"));
        assert!(!m.paths_under_workspace());
    }
}
