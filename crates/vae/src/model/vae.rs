use burn::module::Ignored;
use burn::nn::{Linear, LinearConfig, LinearRecord};
use burn::prelude::*;
use burn::tensor::activation::{log_sigmoid, relu};
use burn::tensor::Distribution;

/// ln(2π), used by the Gaussian log-density.
const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Likelihood used for the decoder's `p(x|z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconstructionDistribution {
    /// Independent Bernoulli per feature; inputs expected in `[0, 1]`.
    Bernoulli,
    /// Independent Gaussian per feature with learned mean and log-variance.
    #[default]
    Gaussian,
}

impl ReconstructionDistribution {
    /// Number of decoder outputs needed per input feature.
    pub fn params_per_feature(&self) -> usize {
        match self {
            Self::Bernoulli => 1,
            Self::Gaussian => 2,
        }
    }
}

/// Configuration for the variational autoencoder.
///
/// Serialized as JSON alongside the parameter record, so a scorer on another
/// process can rebuild the exact topology before loading weights.
///
/// ```text
/// x: (batch, n_in)
///   → [Linear → ReLU] * encoder_layer_sizes
///   → z_mean, z_log_var: (batch, n_latent)
///   → z = z_mean + exp(0.5 * z_log_var) * ε,  ε ~ N(0, I)
///   → [Linear → ReLU] * decoder_layer_sizes
///   → Linear → distribution parameters: (batch, n_in * params_per_feature)
/// ```
#[derive(Config, Debug)]
pub struct VaeConfig {
    /// Input feature width.
    pub n_in: usize,
    /// Latent dimension.
    pub n_latent: usize,
    /// Hidden layer widths of the encoder, input side first.
    #[config(default = "vec![64]")]
    pub encoder_layer_sizes: Vec<usize>,
    /// Hidden layer widths of the decoder, latent side first.
    #[config(default = "vec![64]")]
    pub decoder_layer_sizes: Vec<usize>,
    /// Reconstruction distribution for `p(x|z)`.
    #[config(default = "ReconstructionDistribution::Gaussian")]
    pub distribution: ReconstructionDistribution,
}

impl VaeConfig {
    /// Reject topologies with zero-width layers.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.n_in > 0, "n_in must be > 0");
        anyhow::ensure!(self.n_latent > 0, "n_latent must be > 0");
        if let Some(i) = self.encoder_layer_sizes.iter().position(|&s| s == 0) {
            anyhow::bail!("encoder layer {i} has zero width");
        }
        if let Some(i) = self.decoder_layer_sizes.iter().position(|&s| s == 0) {
            anyhow::bail!("decoder layer {i} has zero width");
        }
        Ok(())
    }

    /// Initialize a VAE with random weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vae<B> {
        let encoder = mlp(self.n_in, &self.encoder_layer_sizes, device);
        let d_encoded = self.encoder_layer_sizes.last().copied().unwrap_or(self.n_in);

        let decoder = mlp(self.n_latent, &self.decoder_layer_sizes, device);
        let d_decoded = self
            .decoder_layer_sizes
            .last()
            .copied()
            .unwrap_or(self.n_latent);

        Vae {
            encoder,
            z_mean: LinearConfig::new(d_encoded, self.n_latent).init(device),
            z_log_var: LinearConfig::new(d_encoded, self.n_latent).init(device),
            decoder,
            output: LinearConfig::new(
                d_decoded,
                self.n_in * self.distribution.params_per_feature(),
            )
            .init(device),
            n_in: self.n_in,
            n_latent: self.n_latent,
            distribution: Ignored(self.distribution),
        }
    }

    /// Expected `[d_input, d_output]` weight shape of every linear layer, in
    /// forward order.
    fn layer_shapes(&self) -> Vec<(String, [usize; 2])> {
        let mut shapes = Vec::new();
        let mut d_prev = self.n_in;
        for (i, &d) in self.encoder_layer_sizes.iter().enumerate() {
            shapes.push((format!("encoder.{i}"), [d_prev, d]));
            d_prev = d;
        }
        shapes.push(("z_mean".to_string(), [d_prev, self.n_latent]));
        shapes.push(("z_log_var".to_string(), [d_prev, self.n_latent]));

        d_prev = self.n_latent;
        for (i, &d) in self.decoder_layer_sizes.iter().enumerate() {
            shapes.push((format!("decoder.{i}"), [d_prev, d]));
            d_prev = d;
        }
        shapes.push((
            "output".to_string(),
            [d_prev, self.n_in * self.distribution.params_per_feature()],
        ));
        shapes
    }

    /// Initialize a VAE and load `record` into it.
    ///
    /// Layer counts and tensor shapes of the record must match this config;
    /// burn's `load_record` does not check them.
    pub fn init_with_record<B: Backend>(
        &self,
        record: VaeRecord<B>,
        device: &B::Device,
    ) -> anyhow::Result<Vae<B>> {
        anyhow::ensure!(
            record.encoder.len() == self.encoder_layer_sizes.len(),
            "record has {} encoder layers, config expects {}",
            record.encoder.len(),
            self.encoder_layer_sizes.len()
        );
        anyhow::ensure!(
            record.decoder.len() == self.decoder_layer_sizes.len(),
            "record has {} decoder layers, config expects {}",
            record.decoder.len(),
            self.decoder_layer_sizes.len()
        );

        let layers: Vec<&LinearRecord<B>> = record
            .encoder
            .iter()
            .chain([&record.z_mean, &record.z_log_var])
            .chain(record.decoder.iter())
            .chain([&record.output])
            .collect();
        for ((name, expected), layer) in self.layer_shapes().iter().zip(layers) {
            let weight = layer.weight.dims();
            anyhow::ensure!(
                weight == *expected,
                "layer {name} has weight shape {weight:?}, config expects {expected:?}"
            );
            if let Some(bias) = &layer.bias {
                let [d_bias] = bias.dims();
                anyhow::ensure!(
                    d_bias == expected[1],
                    "layer {name} has bias width {d_bias}, config expects {}",
                    expected[1]
                );
            }
        }

        Ok(self.init::<B>(device).load_record(record))
    }
}

fn mlp<B: Backend>(d_input: usize, sizes: &[usize], device: &B::Device) -> Vec<Linear<B>> {
    let mut d_prev = d_input;
    sizes
        .iter()
        .map(|&d| {
            let layer = LinearConfig::new(d_prev, d).init(device);
            d_prev = d;
            layer
        })
        .collect()
}

fn forward_mlp<B: Backend>(layers: &[Linear<B>], x: Tensor<B, 2>) -> Tensor<B, 2> {
    layers
        .iter()
        .fold(x, |h, layer| relu(layer.forward(h)))
}

/// Variational autoencoder scored by reconstruction probability.
///
/// Lower reconstruction probability = less typical input.
#[derive(Module, Debug)]
pub struct Vae<B: Backend> {
    encoder: Vec<Linear<B>>,
    z_mean: Linear<B>,
    z_log_var: Linear<B>,
    decoder: Vec<Linear<B>>,
    output: Linear<B>,
    n_in: usize,
    n_latent: usize,
    distribution: Ignored<ReconstructionDistribution>,
}

impl<B: Backend> Vae<B> {
    /// Input feature width.
    pub fn n_in(&self) -> usize {
        self.n_in
    }

    /// Latent dimension.
    pub fn n_latent(&self) -> usize {
        self.n_latent
    }

    pub fn distribution(&self) -> ReconstructionDistribution {
        self.distribution.0
    }

    /// Encode inputs into the posterior `q(z|x)` parameters.
    ///
    /// Input shape: `(batch, n_in)`. Returns `(z_mean, z_log_var)`, each
    /// `(batch, n_latent)`.
    pub fn encode(&self, x: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let h = forward_mlp(&self.encoder, x);
        (self.z_mean.forward(h.clone()), self.z_log_var.forward(h))
    }

    /// Decode latent samples into reconstruction distribution parameters.
    pub fn decode(&self, z: Tensor<B, 2>) -> Tensor<B, 2> {
        self.output.forward(forward_mlp(&self.decoder, z))
    }

    /// Per-example `log p(x|z)` summed over features. Output shape `(batch,)`.
    fn log_likelihood(&self, x: Tensor<B, 2>, params: Tensor<B, 2>) -> Tensor<B, 1> {
        let log_p = match self.distribution.0 {
            ReconstructionDistribution::Bernoulli => {
                // x·log σ(l) + (1−x)·log σ(−l)
                let positive = x.clone() * log_sigmoid(params.clone());
                let negative = x.neg().add_scalar(1.0) * log_sigmoid(params.neg());
                positive + negative
            }
            ReconstructionDistribution::Gaussian => {
                let [batch, _] = params.dims();
                let mean = params.clone().slice([0..batch, 0..self.n_in]);
                let log_var = params.slice([0..batch, self.n_in..2 * self.n_in]);
                let sq_err = (x - mean).powf_scalar(2.0);
                (sq_err / log_var.clone().exp() + log_var)
                    .add_scalar(LN_2PI)
                    .mul_scalar(-0.5)
            }
        };
        log_p.sum_dim(1).squeeze::<1>(1)
    }

    /// Monte Carlo estimate of the reconstruction log-probability.
    ///
    /// Draws `num_samples` latent vectors per example from `q(z|x)` and
    /// averages `log p(x|z)` over the draws. Output shape `(batch,)`, in
    /// input row order.
    pub fn reconstruction_log_probability(
        &self,
        x: Tensor<B, 2>,
        num_samples: usize,
    ) -> anyhow::Result<Tensor<B, 1>> {
        anyhow::ensure!(num_samples > 0, "num_samples must be > 0");
        let [batch, width] = x.dims();
        anyhow::ensure!(
            width == self.n_in,
            "input has {width} features, model expects {}",
            self.n_in
        );

        let device = x.device();
        let (z_mean, z_log_var) = self.encode(x.clone());
        let z_std = z_log_var.mul_scalar(0.5).exp();

        let mut total = Tensor::<B, 1>::zeros([batch], &device);
        for _ in 0..num_samples {
            let eps = Tensor::random(
                [batch, self.n_latent],
                Distribution::Normal(0.0, 1.0),
                &device,
            );
            let z = z_mean.clone() + z_std.clone() * eps;
            total = total + self.log_likelihood(x.clone(), self.decode(z));
        }
        Ok(total.div_scalar(num_samples as f64))
    }

    /// Reconstruction probability: `exp` of [`Self::reconstruction_log_probability`].
    pub fn reconstruction_probability(
        &self,
        x: Tensor<B, 2>,
        num_samples: usize,
    ) -> anyhow::Result<Tensor<B, 1>> {
        Ok(self.reconstruction_log_probability(x, num_samples)?.exp())
    }
}
