//! Tensor bridge: conversions between `Vec<f32>` rows and burn tensors.
//!
//! The Parquet data layer and the base learner work on plain `Vec<f32>`;
//! the backbone works on burn tensors. This module is the boundary.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Convert a batch of flattened CHW images to a burn 4D tensor.
///
/// # Panics
/// Panics if `images` is empty or any image length differs from `c * h * w`.
pub fn images_to_tensor<B: Backend>(
    images: &[Vec<f32>],
    shape: (usize, usize, usize),
    device: &B::Device,
) -> Tensor<B, 4> {
    let (c, h, w) = shape;
    assert!(!images.is_empty(), "images must not be empty");
    let expected = c * h * w;
    for (i, image) in images.iter().enumerate() {
        assert_eq!(
            image.len(),
            expected,
            "image {i} has {} values, expected {expected}",
            image.len()
        );
    }

    let batch = images.len();
    let flat: Vec<f32> = images.iter().flat_map(|v| v.iter().copied()).collect();
    Tensor::from_data(TensorData::new(flat, [batch, c, h, w]), device)
}

/// Convert a batch of feature rows to a burn 2D tensor.
///
/// # Panics
/// Panics if `rows` is empty or row lengths are inconsistent.
pub fn rows_to_tensor<B: Backend>(rows: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    assert!(!rows.is_empty(), "rows must not be empty");
    let dim = rows[0].len();
    assert!(dim > 0, "row dimension must be > 0");
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(
            row.len(),
            dim,
            "row {i} has length {}, expected {dim}",
            row.len()
        );
    }

    let batch = rows.len();
    let flat: Vec<f32> = rows.iter().flat_map(|v| v.iter().copied()).collect();
    Tensor::from_data(TensorData::new(flat, [batch, dim]), device)
}

/// Extract a burn 2D tensor into per-row `Vec<f32>`s.
pub fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> anyhow::Result<Vec<Vec<f32>>> {
    let [batch, dim] = tensor.dims();
    let flat = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to extract tensor data: {e:?}"))?;
    Ok(flat.chunks(dim).take(batch).map(|c| c.to_vec()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_images_to_tensor_shape() {
        let device = Default::default();
        let images: Vec<Vec<f32>> = (0..4).map(|_| vec![0.0_f32; 3 * 8 * 8]).collect();

        let tensor = images_to_tensor::<TestBackend>(&images, (3, 8, 8), &device);
        assert_eq!(tensor.dims(), [4, 3, 8, 8]);
    }

    #[test]
    fn test_rows_roundtrip() {
        let device = Default::default();
        let rows = vec![vec![1.0_f32, 2.0, 3.0], vec![4.0, 5.0, 6.0]];

        let tensor = rows_to_tensor::<TestBackend>(&rows, &device);
        assert_eq!(tensor.dims(), [2, 3]);

        let back = tensor_to_rows::<TestBackend>(tensor).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    #[should_panic(expected = "expected 12")]
    fn test_images_to_tensor_bad_length_panics() {
        let device = Default::default();
        let images = vec![vec![0.0_f32; 7]];
        images_to_tensor::<TestBackend>(&images, (3, 2, 2), &device);
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn test_rows_to_tensor_empty_panics() {
        let device = Default::default();
        rows_to_tensor::<TestBackend>(&[], &device);
    }
}
