//! Tensor bridge: conversions between plain `Vec<f32>` feature rows and
//! burn tensors.
//!
//! Feature files and wire formats carry `Vec<f32>`; the VAE needs
//! `Tensor<B, 2>` inputs and produces `Tensor<B, 1>` scores.

use burn::prelude::*;
use burn::tensor::TensorData;

/// Convert feature rows to a burn 2D tensor of shape `(rows, width)`.
///
/// Fails on empty input, zero-width rows, or rows of inconsistent length.
pub fn rows_to_tensor<B: Backend>(
    rows: &[Vec<f32>],
    device: &B::Device,
) -> anyhow::Result<Tensor<B, 2>> {
    anyhow::ensure!(!rows.is_empty(), "feature rows must not be empty");
    let width = rows[0].len();
    anyhow::ensure!(width > 0, "feature width must be > 0");
    for (i, row) in rows.iter().enumerate() {
        anyhow::ensure!(
            row.len() == width,
            "row {i} has length {}, expected {width}",
            row.len()
        );
    }

    let flat: Vec<f32> = rows.iter().flat_map(|v| v.iter().copied()).collect();
    Ok(Tensor::from_data(
        TensorData::new(flat, [rows.len(), width]),
        device,
    ))
}

/// Convert a single feature vector to a burn 2D tensor of shape `(1, width)`.
pub fn row_to_tensor<B: Backend>(row: &[f32], device: &B::Device) -> anyhow::Result<Tensor<B, 2>> {
    anyhow::ensure!(!row.is_empty(), "feature width must be > 0");
    Ok(Tensor::from_data(
        TensorData::new(row.to_vec(), [1, row.len()]),
        device,
    ))
}

/// Extract f64 values from a burn 1D tensor.
pub fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> anyhow::Result<Vec<f64>> {
    let data = tensor.into_data().convert::<f32>();
    let values = data
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read tensor data: {e:?}"))?;
    Ok(values.into_iter().map(|v| v as f64).collect())
}
