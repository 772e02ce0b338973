//! Read-only model bundle shared by every scoring partition.
//!
//! A `ModelBroadcast` holds the JSON-serialized [`VaeConfig`] and the binary
//! parameter record. Cloning is cheap (`Arc`), so each partition gets its own
//! handle and rebuilds a private model on its own device.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};

use crate::model::vae::{Vae, VaeConfig};

/// File name of the JSON config inside a model directory.
pub const CONFIG_FILE: &str = "config.json";
/// File name of the binary parameter record inside a model directory.
pub const PARAMS_FILE: &str = "params.bin";

/// Immutable config + parameters of a trained VAE.
#[derive(Debug, Clone)]
pub struct ModelBroadcast {
    config_json: Arc<str>,
    params: Arc<[u8]>,
}

impl ModelBroadcast {
    /// Wrap an already-serialized config and parameter record.
    pub fn new(config_json: impl Into<Arc<str>>, params: impl Into<Arc<[u8]>>) -> Self {
        Self {
            config_json: config_json.into(),
            params: params.into(),
        }
    }

    /// Serialize a model and the config it was built from.
    pub fn from_model<B: Backend>(config: &VaeConfig, model: Vae<B>) -> anyhow::Result<Self> {
        let config_json =
            serde_json::to_string_pretty(config).context("Failed to serialize VAE config")?;
        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
        let params = Recorder::<B>::record(&recorder, model.into_record(), ())
            .map_err(|e| anyhow::anyhow!("Failed to serialize model parameters: {e}"))?;
        Ok(Self::new(config_json, params))
    }

    /// Raw JSON config text.
    pub fn config_json(&self) -> &str {
        &self.config_json
    }

    /// Raw parameter record bytes.
    pub fn params(&self) -> &[u8] {
        &self.params
    }

    /// Parse and validate the model config.
    pub fn config(&self) -> anyhow::Result<VaeConfig> {
        let config: VaeConfig =
            serde_json::from_str(&self.config_json).context("Failed to parse VAE config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Rebuild the model on `device`: init from config, then load parameters.
    ///
    /// Fails if the parameter record does not decode or its layer shapes do
    /// not match the config.
    pub fn load<B: Backend>(&self, device: &B::Device) -> anyhow::Result<Vae<B>> {
        let config = self.config()?;
        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
        let record = Recorder::<B>::load(&recorder, self.params.to_vec(), device)
            .map_err(|e| anyhow::anyhow!("Failed to load model parameters: {e}"))?;
        config
            .init_with_record(record, device)
            .context("Model parameters do not match config")
    }

    /// Write `config.json` and `params.bin` into `dir`, creating it if needed.
    pub fn save_dir(&self, dir: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        std::fs::write(dir.join(CONFIG_FILE), self.config_json.as_bytes())?;
        std::fs::write(dir.join(PARAMS_FILE), &self.params)?;
        tracing::info!(
            dir = %dir.display(),
            params_bytes = self.params.len(),
            "Saved model bundle"
        );
        Ok(())
    }

    /// Read a bundle previously written by [`Self::save_dir`].
    pub fn load_dir(dir: &Path) -> anyhow::Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        let params_path = dir.join(PARAMS_FILE);
        let config_json = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let params = std::fs::read(&params_path)
            .with_context(|| format!("Failed to read {}", params_path.display()))?;
        tracing::info!(
            dir = %dir.display(),
            params_bytes = params.len(),
            "Loaded model bundle"
        );
        Ok(Self::new(config_json, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::vae::ReconstructionDistribution;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn small_config() -> VaeConfig {
        VaeConfig::new(5, 2)
            .with_encoder_layer_sizes(vec![6])
            .with_decoder_layer_sizes(vec![6])
            .with_distribution(ReconstructionDistribution::Bernoulli)
    }

    #[test]
    fn test_round_trip_preserves_encoder() {
        let device = Default::default();
        let config = small_config();
        let model = config.init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 2>::random([3, 5], Distribution::Normal(0.0, 1.0), &device);
        let (mean_before, _) = model.encode(x.clone());

        let broadcast = ModelBroadcast::from_model(&config, model).unwrap();
        let restored = broadcast.load::<TestBackend>(&device).unwrap();
        let (mean_after, _) = restored.encode(x);

        let before: Vec<f32> = mean_before.into_data().to_vec().unwrap();
        let after: Vec<f32> = mean_after.into_data().to_vec().unwrap();
        for (b, a) in before.iter().zip(&after) {
            assert!((b - a).abs() < 1e-6, "encoder output changed: {b} vs {a}");
        }
        assert_eq!(restored.distribution(), ReconstructionDistribution::Bernoulli);
    }

    #[test]
    fn test_config_json_is_readable() {
        let device = Default::default();
        let config = small_config();
        let broadcast =
            ModelBroadcast::from_model(&config, config.init::<TestBackend>(&device)).unwrap();

        let value: serde_json::Value = serde_json::from_str(broadcast.config_json()).unwrap();
        assert_eq!(value["n_in"], 5);
        assert_eq!(value["distribution"], "bernoulli");
        assert!(!broadcast.params().is_empty());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let broadcast = ModelBroadcast::new("{not json", Vec::<u8>::new());
        let err = broadcast.load::<TestBackend>(&device).unwrap_err().to_string();
        assert!(err.contains("config JSON"), "unexpected error: {err}");
    }

    #[test]
    fn test_truncated_params_rejected() {
        let device = Default::default();
        let config = small_config();
        let broadcast =
            ModelBroadcast::from_model(&config, config.init::<TestBackend>(&device)).unwrap();
        let truncated = ModelBroadcast::new(
            broadcast.config_json().to_string(),
            broadcast.params()[..4].to_vec(),
        );
        let err = truncated.load::<TestBackend>(&device).unwrap_err().to_string();
        assert!(err.contains("model parameters"), "unexpected error: {err}");
    }

    #[test]
    fn test_params_from_other_topology_rejected() {
        let device = Default::default();
        let config = small_config();
        let other = VaeConfig::new(3, 2)
            .with_encoder_layer_sizes(vec![6])
            .with_decoder_layer_sizes(vec![6])
            .with_distribution(ReconstructionDistribution::Bernoulli);
        let donor =
            ModelBroadcast::from_model(&other, other.init::<TestBackend>(&device)).unwrap();
        let mixed = ModelBroadcast::new(
            serde_json::to_string(&config).unwrap(),
            donor.params().to_vec(),
        );

        let err = format!("{:#}", mixed.load::<TestBackend>(&device).unwrap_err());
        assert!(err.contains("do not match config"), "unexpected error: {err}");
        assert!(err.contains("encoder.0"), "unexpected error: {err}");
    }

    #[test]
    fn test_params_with_missing_layer_rejected() {
        let device = Default::default();
        let config = small_config();
        let deeper = small_config().with_encoder_layer_sizes(vec![6, 6]);
        let donor =
            ModelBroadcast::from_model(&deeper, deeper.init::<TestBackend>(&device)).unwrap();
        let mixed = ModelBroadcast::new(
            serde_json::to_string(&config).unwrap(),
            donor.params().to_vec(),
        );

        let err = format!("{:#}", mixed.load::<TestBackend>(&device).unwrap_err());
        assert!(err.contains("2 encoder layers"), "unexpected error: {err}");
    }

    #[test]
    fn test_save_and_load_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let device = Default::default();
        let config = small_config();
        let broadcast =
            ModelBroadcast::from_model(&config, config.init::<TestBackend>(&device)).unwrap();

        let dir = tmp.path().join("model");
        broadcast.save_dir(&dir).unwrap();
        assert!(dir.join(CONFIG_FILE).exists());
        assert!(dir.join(PARAMS_FILE).exists());

        let loaded = ModelBroadcast::load_dir(&dir).unwrap();
        assert_eq!(loaded.config_json(), broadcast.config_json());
        assert_eq!(loaded.params(), broadcast.params());
    }
}
