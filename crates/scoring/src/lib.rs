//! Batched, key-preserving reconstruction-probability scoring.
//!
//! Turns a forward-only iterator of `(key, example)` pairs into
//! `(key, score)` pairs, one model call per fixed-size batch. Uses
//! trait-based seams so the batching protocol can be tested with mocks
//! (no trained model, no GPU).
//!
//! # Key types
//!
//! - [`BatchScorer`] — the per-partition batching loop
//! - [`ScoringConfig`] — batch size, log/raw probability, sample count
//! - [`ReconstructionModel`] / [`ModelProvider`] — the model and how to build it
//! - [`ExecutionQueue`] — end-of-call barrier over queued backend work
//! - [`VaeModelProvider`] — builds a `vae::Vae` from a broadcast bundle

pub mod adapters;
pub mod backend;
pub mod config;
pub mod mocks;
pub mod scorer;

pub use adapters::VaeModelProvider;
pub use backend::{stack_examples, DeviceQueue, ExecutionQueue, Synchronous};
pub use config::ScoringConfig;
pub use scorer::{BatchScorer, ModelProvider, ReconstructionModel, ScoreError, ScoreResult};
