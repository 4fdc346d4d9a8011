//! Shared data model for the Sheet Capture Pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their state machine, and pipeline options
//! - ROI geometry (Quadrilateral)
//! - Decoded frames, rectified captures, and page candidates
//! - The published manifest
//! - The fixed `error_code` taxonomy

pub mod capture;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod job;
pub mod manifest;
pub mod options;
pub mod page;

pub use capture::{BoundingBox, PerceptualHash, RectifiedCapture};
pub use error::ErrorCode;
pub use frame::{Colorspace, Frame};
pub use geometry::{Point, Quadrilateral, MIN_ROI_AREA_FRACTION};
pub use job::{Job, JobId, JobState, JobStep, SourceDescriptor, TimeWindow};
pub use manifest::{Manifest, ReviewCandidate, ReviewExportInfo, Resolution, RuntimeInfo};
pub use options::{
    DetectOptions, ExportFormat, ExportOptions, ExtractOptions, LayoutHint, PipelineOptions,
    Sensitivity, StitchOptions, UpscaleFactor, UpscaleOptions,
};
pub use page::{ComposedPage, PageCandidate, PageOrigin};
