//! Backend-agnostic representation of model outputs.

use crate::core::errors::DetectorError;
use ndarray::{Array2, Array4, ArrayD, IxDyn};

/// Raw tensor returned by an inference call.
///
/// The detector that owns the model is responsible for interpreting the shape.
#[derive(Debug, Clone)]
pub enum TensorOutput {
    /// 32-bit floating point tensor
    F32 { shape: Vec<i64>, data: Vec<f32> },
    /// 64-bit integer tensor
    I64 { shape: Vec<i64>, data: Vec<i64> },
}

impl TensorOutput {
    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[i64] {
        match self {
            TensorOutput::F32 { shape, .. } => shape,
            TensorOutput::I64 { shape, .. } => shape,
        }
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Converts into a dynamic-rank f32 array, casting integer data.
    pub fn into_array_f32(self) -> Result<ArrayD<f32>, DetectorError> {
        let (shape, data) = match self {
            TensorOutput::F32 { shape, data } => (shape, data),
            TensorOutput::I64 { shape, data } => {
                (shape, data.into_iter().map(|v| v as f32).collect())
            }
        };
        if shape.iter().any(|&d| d < 0) {
            return Err(DetectorError::InvalidInput {
                message: format!("output has dynamic dimension in shape {shape:?}"),
            });
        }
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let expected_len: usize = dims.iter().product();
        if data.len() != expected_len {
            return Err(DetectorError::InvalidInput {
                message: format!(
                    "Data length mismatch: expected {}, got {}",
                    expected_len,
                    data.len()
                ),
            });
        }
        ArrayD::from_shape_vec(IxDyn(&dims), data).map_err(DetectorError::Tensor)
    }

    /// Attempts to extract as a 2D f32 array, dropping leading unit dimensions.
    ///
    /// `[1, N, C]` and `[N, C]` both become `[N, C]`.
    pub fn try_into_array2_f32(self) -> Result<Array2<f32>, DetectorError> {
        let mut array = self.into_array_f32()?;
        while array.ndim() > 2 && array.shape()[0] == 1 {
            array = array.index_axis_move(ndarray::Axis(0), 0);
        }
        let shape = array.shape().to_vec();
        array
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(|_| DetectorError::InvalidInput {
                message: format!("Expected 2D tensor, got shape {shape:?}"),
            })
    }

    /// Attempts to extract as a 4D f32 array.
    pub fn try_into_array4_f32(self) -> Result<Array4<f32>, DetectorError> {
        let array = self.into_array_f32()?;
        let shape = array.shape().to_vec();
        array
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|_| DetectorError::InvalidInput {
                message: format!("Expected 4D tensor, got shape {shape:?}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_into_array2_squeezes_batch_dimension() {
        let output = TensorOutput::F32 {
            shape: vec![1, 2, 3],
            data: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        };
        let array = output.try_into_array2_f32().unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[1, 2]], 5.0);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let output = TensorOutput::F32 {
            shape: vec![2, 2],
            data: vec![0.0; 3],
        };
        assert!(output.try_into_array2_f32().is_err());
    }

    #[test]
    fn test_i64_output_is_cast() {
        let output = TensorOutput::I64 {
            shape: vec![1, 1, 1, 2],
            data: vec![3, 4],
        };
        assert_eq!(output.ndim(), 4);
        let array = output.try_into_array4_f32().unwrap();
        assert_eq!(array[[0, 0, 0, 1]], 4.0);
    }
}
