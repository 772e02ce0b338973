//! VAE model components: the encoder/decoder network with its JSON config,
//! and the tensor bridge between feature rows and burn tensors.

pub mod bridge;
pub mod vae;
