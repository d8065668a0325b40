//! Image preprocessing and model-output postprocessing.
//!
//! - [`filters`]: reversible filter chain around a detector
//! - [`letterbox`]: square model input for the OBB detector
//! - [`normalization`]: NCHW tensor conversion
//! - [`db_postprocess`]: heat-map to box decoding
//! - [`obb_postprocess`]: oriented-box decoding, rotated NMS and deduplication
//! - [`merge`]: hybrid reconciliation of two detectors' boxes
//! - [`geometry`]: shared geometric primitives

pub mod db_postprocess;
pub mod filters;
pub mod geometry;
pub mod letterbox;
pub mod merge;
pub mod normalization;
pub mod obb_postprocess;

pub use db_postprocess::{DbOutput, DbPostProcess, DbThresholds};
pub use filters::{AppliedFilters, FilterChain};
pub use geometry::{BoundingBox, MinAreaRect, Point};
pub use letterbox::LetterboxTransform;
pub use merge::merge_detection_boxes;
pub use normalization::NormalizeImage;
pub use obb_postprocess::{ObbDecodeConfig, ObbPostProcess};
