//! Domain types shared across detectors and the pipeline.

pub mod oriented_box;
pub mod request;

pub use oriented_box::{Aabb, Orientation, OrientedBox};
pub use request::{
    DetectionParams, DetectionRequest, DetectionResult, HybridConfig, ProbabilityMask,
    RawDetection,
};
