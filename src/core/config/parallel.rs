//! Parallel processing configuration.

use serde::{Deserialize, Serialize};

/// Controls when the pipeline fans work out over the rayon pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParallelPolicy {
    /// Maximum number of threads to use for parallel processing.
    /// If None, rayon will use its default pool size (typically the number of CPU cores).
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Batches with at most this many requests run sequentially.
    #[serde(default = "ParallelPolicy::default_batch_threshold")]
    pub batch_threshold: usize,

    /// Box-scoring regions with at most this many pixels are scored on the calling thread.
    #[serde(default = "ParallelPolicy::default_postprocess_pixel_threshold")]
    pub postprocess_pixel_threshold: usize,
}

impl ParallelPolicy {
    /// Create a new ParallelPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of threads.
    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the batch threshold.
    pub fn with_batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = threshold;
        self
    }

    /// Set the postprocessing pixel threshold.
    pub fn with_postprocess_pixel_threshold(mut self, threshold: usize) -> Self {
        self.postprocess_pixel_threshold = threshold;
        self
    }

    /// Install the global rayon thread pool with the configured number of threads.
    ///
    /// Call once at startup, before any parallel work.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the thread pool was configured
    /// - `Ok(false)` if `max_threads` is None
    /// - `Err` if the global pool has already been initialized
    pub fn install_global_thread_pool(&self) -> Result<bool, rayon::ThreadPoolBuildError> {
        if let Some(num_threads) = self.max_threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn default_batch_threshold() -> usize {
        1
    }

    fn default_postprocess_pixel_threshold() -> usize {
        8_000
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            batch_threshold: Self::default_batch_threshold(),
            postprocess_pixel_threshold: Self::default_postprocess_pixel_threshold(),
        }
    }
}
