//! Model implementations and weight management.
//!
//! Models here are pure: preprocessing, the forward pass and decoding.
//! Loading, caching and filtering belong to [`crate::detector`].

pub mod detection;
pub mod weights;

pub use detection::{DbModel, YoloObbModel};
pub use weights::{HttpWeightFetcher, ModelWeights, WeightFetcher, ensure_weights};
