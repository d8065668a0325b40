//! Pixel normalization into NCHW model input tensors.

use crate::core::errors::{DetectorError, ProcessingStage};
use image::RgbImage;
use ndarray::Array4;

/// Per-channel affine normalization: `value * alpha + beta`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeImage {
    /// Scaling factors for each channel.
    pub alpha: [f32; 3],
    /// Offset values for each channel.
    pub beta: [f32; 3],
}

impl NormalizeImage {
    /// Creates a normalizer from `scale`, per-channel `mean` and `std`.
    ///
    /// `alpha = scale / std`, `beta = -mean / std`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `scale` or any `std` entry is not positive.
    pub fn new(scale: f32, mean: [f32; 3], std: [f32; 3]) -> Result<Self, DetectorError> {
        if scale <= 0.0 {
            return Err(DetectorError::invalid_field("scale", "> 0", scale.to_string()));
        }
        if let Some(bad) = std.iter().find(|s| **s <= 0.0) {
            return Err(DetectorError::invalid_field("std", "> 0", bad.to_string()));
        }
        Ok(Self {
            alpha: [0, 1, 2].map(|c| scale / std[c]),
            beta: [0, 1, 2].map(|c| -mean[c] / std[c]),
        })
    }

    /// Maps `0..=255` onto `0.0..=1.0`.
    pub fn unit_range() -> Self {
        Self {
            alpha: [1.0 / 255.0; 3],
            beta: [0.0; 3],
        }
    }

    /// Maps `0..=255` onto `-1.0..=1.0`.
    pub fn symmetric() -> Self {
        Self {
            alpha: [1.0 / 127.5; 3],
            beta: [-1.0; 3],
        }
    }

    /// Normalizes an RGB image into a `[1, 3, H, W]` tensor in RGB channel order.
    pub fn normalize_to(&self, img: &RgbImage) -> Result<Array4<f32>, DetectorError> {
        let (width, height) = img.dimensions();
        let (w, h) = (width as usize, height as usize);
        let plane = w * h;
        let mut result = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in img.enumerate_pixels() {
            let idx = y as usize * w + x as usize;
            for c in 0..3 {
                result[c * plane + idx] = pixel[c] as f32 * self.alpha[c] + self.beta[c];
            }
        }

        Array4::from_shape_vec((1, 3, h, w), result).map_err(|e| {
            DetectorError::processing_error(
                ProcessingStage::TensorOperation,
                format!("failed to build CHW tensor for {width}x{height} image"),
                e,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_unit_range_layout_is_chw() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 51]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));

        let tensor = NormalizeImage::unit_range().normalize_to(&img).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] - 0.2).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_symmetric_bounds() {
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, Rgb([0, 255, 0]));
        let tensor = NormalizeImage::symmetric().normalize_to(&img).unwrap();
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_new_rejects_non_positive_std() {
        assert!(NormalizeImage::new(1.0, [0.0; 3], [1.0, 0.0, 1.0]).is_err());
        let norm = NormalizeImage::new(1.0 / 255.0, [0.5; 3], [0.5; 3]).unwrap();
        assert!((norm.beta[0] + 1.0).abs() < 1e-6);
    }
}
