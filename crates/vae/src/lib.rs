//! Variational autoencoder for reconstruction-probability scoring.
//!
//! Provides a burn VAE whose reconstruction probability (or log-probability)
//! serves as a per-example anomaly score (lower = less typical), plus the
//! broadcast bundle (JSON config + binary parameter record) used to rebuild
//! the model inside each scoring partition. No training lives here.

pub mod broadcast;
pub mod model;

pub use broadcast::ModelBroadcast;
pub use model::bridge::{row_to_tensor, rows_to_tensor, tensor_to_vec};
pub use model::vae::{ReconstructionDistribution, Vae, VaeConfig};
