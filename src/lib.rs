//! # Manga Text Detect
//!
//! Text region detection for comic and manga pages using ONNX models.
//!
//! ## Features
//!
//! - Pluggable detectors selected by [`detector::DetectorKind`]
//! - DB heat-map detector for text lines and an oriented-box (OBB) detector for speech bubbles
//! - Hybrid mode that fuses both detectors' boxes
//! - Reversible preprocessing: rotation, small-image padding, inversion and gamma correction
//! - Automatic rotation retry for pages dominated by horizontal text
//! - Lazy, thread-safe model loading with checksum-verified weight downloads
//!
//! ## Modules
//!
//! * [`core`] - Configuration, error handling and ONNX Runtime sessions
//! * [`domain`] - Oriented boxes, requests and results
//! * [`detector`] - Detector implementations and the detector registry
//! * [`models`] - Model wrappers and weight management
//! * [`pipeline`] - The detection entry point
//! * [`processors`] - Image filters and model-output decoding
//! * [`utils`] - Logging and image loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use manga_text_detect::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = DetectorRegistry::new(RegistryConfig::default().with_model_dir("models"));
//! let pipeline = TextDetectionPipeline::new(registry);
//!
//! let image = load_image(Path::new("page.png"))?;
//! let request = DetectionRequest::new(image).with_hybrid(HybridConfig {
//!     enabled: true,
//!     ..Default::default()
//! });
//! let result = pipeline.detect(DetectorKind::Default, &request)?;
//! for b in &result.boxes {
//!     println!("{:?} score={:.2}", b.corners(), b.score());
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod detector;
pub mod domain;
pub mod models;
pub mod pipeline;
pub mod processors;
pub mod utils;

/// Prelude module for convenient imports.
///
/// ```rust
/// use manga_text_detect::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{DetectorError, DetectorResult, Device};
    pub use crate::detector::{DetectorKind, DetectorRegistry, RegistryConfig};
    pub use crate::domain::{
        DetectionParams, DetectionRequest, DetectionResult, HybridConfig, OrientedBox,
    };
    pub use crate::pipeline::TextDetectionPipeline;
    pub use crate::utils::load_image;
}
