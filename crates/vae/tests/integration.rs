//! Integration tests for the VAE crate.
//!
//! These tests exercise cross-module interactions: bridge -> model -> score
//! extraction, and config + parameters through a broadcast bundle on disk.
//! All use the NdArray backend and synthetic data.

use burn::backend::ndarray::NdArray;
use burn::prelude::*;
use tempfile::TempDir;

use vae::{
    row_to_tensor, rows_to_tensor, tensor_to_vec, ModelBroadcast, ReconstructionDistribution,
    VaeConfig,
};

type TestBackend = NdArray<f32>;

fn binary_rows(n: usize, width: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|i| (0..width).map(|j| ((i + j) % 2) as f32).collect())
        .collect()
}

#[test]
fn test_rows_to_scores_pipeline() {
    let device = Default::default();
    let config = VaeConfig::new(8, 3)
        .with_encoder_layer_sizes(vec![16])
        .with_decoder_layer_sizes(vec![16])
        .with_distribution(ReconstructionDistribution::Bernoulli);
    let model = config.init::<TestBackend>(&device);

    let rows = binary_rows(10, 8);
    let x = rows_to_tensor::<TestBackend>(&rows, &device).unwrap();
    let scores = tensor_to_vec::<TestBackend>(model.reconstruction_log_probability(x, 4).unwrap())
        .unwrap();

    assert_eq!(scores.len(), 10);
    assert!(scores.iter().all(|s| s.is_finite() && *s <= 0.0), "got {scores:?}");
}

#[test]
fn test_single_rows_stack_like_batch() {
    // Concatenating single-row tensors yields the same input as building
    // the batch directly.
    let device = Default::default();
    let rows = binary_rows(3, 4);

    let singles: Vec<Tensor<TestBackend, 2>> = rows
        .iter()
        .map(|r| row_to_tensor::<TestBackend>(r, &device).unwrap())
        .collect();
    let stacked = Tensor::cat(singles, 0);
    let direct = rows_to_tensor::<TestBackend>(&rows, &device).unwrap();

    let a: Vec<f32> = stacked.into_data().to_vec().unwrap();
    let b: Vec<f32> = direct.into_data().to_vec().unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_broadcast_on_disk_rebuilds_same_model() {
    let tmp = TempDir::new().unwrap();
    let device = Default::default();
    let config = VaeConfig::new(6, 2).with_encoder_layer_sizes(vec![5, 4]);
    let model = config.init::<TestBackend>(&device);

    let x = rows_to_tensor::<TestBackend>(&binary_rows(4, 6), &device).unwrap();
    let (mean_before, log_var_before) = model.encode(x.clone());

    ModelBroadcast::from_model(&config, model)
        .unwrap()
        .save_dir(tmp.path())
        .unwrap();

    let restored = ModelBroadcast::load_dir(tmp.path())
        .unwrap()
        .load::<TestBackend>(&device)
        .unwrap();
    assert_eq!(restored.n_in(), 6);
    assert_eq!(restored.n_latent(), 2);
    assert_eq!(restored.distribution(), ReconstructionDistribution::Gaussian);

    let (mean_after, log_var_after) = restored.encode(x);
    let diff_mean: f32 = (mean_before - mean_after).abs().sum().into_scalar().elem();
    let diff_var: f32 = (log_var_before - log_var_after).abs().sum().into_scalar().elem();
    assert!(diff_mean < 1e-5, "z_mean differs after reload: {diff_mean}");
    assert!(diff_var < 1e-5, "z_log_var differs after reload: {diff_var}");
}

#[test]
fn test_broadcast_clone_shares_bytes() {
    let device = Default::default();
    let config = VaeConfig::new(3, 1);
    let broadcast =
        ModelBroadcast::from_model(&config, config.init::<TestBackend>(&device)).unwrap();
    let clone = broadcast.clone();

    assert!(std::ptr::eq(broadcast.params().as_ptr(), clone.params().as_ptr()));
    assert!(clone.load::<TestBackend>(&device).is_ok());
}

#[test]
fn test_invalid_config_in_bundle_rejected() {
    let device = Default::default();
    let config = VaeConfig::new(3, 1);
    let broadcast =
        ModelBroadcast::from_model(&config, config.init::<TestBackend>(&device)).unwrap();

    let bad_json = broadcast.config_json().replace("\"n_latent\": 1", "\"n_latent\": 0");
    let bad = ModelBroadcast::new(bad_json, broadcast.params().to_vec());
    let err = bad.load::<TestBackend>(&device).unwrap_err().to_string();
    assert!(err.contains("n_latent"), "unexpected error: {err}");
}
