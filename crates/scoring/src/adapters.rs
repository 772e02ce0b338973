//! Adapters wiring the `vae` crate into the scoring traits.

use burn::prelude::*;
use vae::{ModelBroadcast, Vae};

use crate::scorer::{ModelProvider, ReconstructionModel};

impl<B: Backend> ReconstructionModel<B> for Vae<B> {
    fn reconstruction_probability(
        &self,
        x: Tensor<B, 2>,
        num_samples: usize,
    ) -> anyhow::Result<Tensor<B, 1>> {
        Vae::reconstruction_probability(self, x, num_samples)
    }

    fn reconstruction_log_probability(
        &self,
        x: Tensor<B, 2>,
        num_samples: usize,
    ) -> anyhow::Result<Tensor<B, 1>> {
        Vae::reconstruction_log_probability(self, x, num_samples)
    }
}

/// Rebuilds a [`Vae`] from a shared [`ModelBroadcast`] on every call.
#[derive(Debug, Clone)]
pub struct VaeModelProvider {
    broadcast: ModelBroadcast,
}

impl VaeModelProvider {
    pub fn new(broadcast: ModelBroadcast) -> Self {
        Self { broadcast }
    }

    pub fn broadcast(&self) -> &ModelBroadcast {
        &self.broadcast
    }
}

impl<B: Backend> ModelProvider<B> for VaeModelProvider {
    type Model = Vae<B>;

    fn get_model(&self, device: &B::Device) -> anyhow::Result<Vae<B>> {
        let model = self.broadcast.load::<B>(device)?;
        tracing::debug!(
            n_in = model.n_in(),
            n_latent = model.n_latent(),
            distribution = ?model.distribution(),
            "Built VAE from broadcast"
        );
        Ok(model)
    }
}
