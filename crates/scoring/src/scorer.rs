//! Batched reconstruction-probability scoring of keyed examples.
//!
//! `BatchScorer` drains a forward-only `(key, example)` iterator in
//! fixed-size batches, scores each batch with one model call, and pairs the
//! scores back with their keys in input order.

use burn::prelude::*;

use vae::tensor_to_vec;

use crate::backend::{stack_examples, DeviceQueue, ExecutionQueue};
use crate::config::ScoringConfig;

/// Errors that can occur while scoring a partition.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    /// An example's leading dimension was not 1 (one key, one example).
    #[error(
        "Cannot score examples with one key per example if an example holds \
         more than 1 row (num_examples: {num_examples})"
    )]
    MalformedExample {
        /// Leading dimension of the offending example.
        num_examples: usize,
    },
    /// The model provider failed to build a model.
    #[error("Model construction failed: {0}")]
    ModelConstruction(#[source] anyhow::Error),
    /// Stacking, scoring, or flushing failed in the numeric backend.
    #[error("Backend computation failed: {0}")]
    Backend(#[source] anyhow::Error),
    /// Batch size or sample count out of range.
    #[error("Invalid scoring config: {0}")]
    InvalidConfig(String),
}

/// `(key, score)` pairs in input order.
pub type ScoreResult<K> = Vec<(K, f64)>;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Generative model exposing per-example reconstruction scores.
///
/// Both methods take a `(batch, features)` tensor and return one score per
/// row, in row order.
pub trait ReconstructionModel<B: Backend> {
    /// Raw reconstruction probability.
    fn reconstruction_probability(
        &self,
        x: Tensor<B, 2>,
        num_samples: usize,
    ) -> anyhow::Result<Tensor<B, 1>>;

    /// Reconstruction log-probability.
    fn reconstruction_log_probability(
        &self,
        x: Tensor<B, 2>,
        num_samples: usize,
    ) -> anyhow::Result<Tensor<B, 1>>;
}

/// Builds a ready-to-score model on a device.
///
/// Called at most once per [`BatchScorer::score`] call.
pub trait ModelProvider<B: Backend> {
    type Model: ReconstructionModel<B>;

    fn get_model(&self, device: &B::Device) -> anyhow::Result<Self::Model>;
}

// ---------------------------------------------------------------------------
// BatchScorer
// ---------------------------------------------------------------------------

/// Per-partition batch scorer.
///
/// Holds no state between calls besides its configuration; each `score`
/// call builds its own model and batch buffers.
pub struct BatchScorer<B: Backend, P> {
    provider: P,
    config: ScoringConfig,
    device: B::Device,
    queue: Box<dyn ExecutionQueue>,
}

impl<B: Backend, P: ModelProvider<B>> BatchScorer<B, P> {
    /// Create a scorer flushing `B`'s device queue after each call.
    pub fn new(provider: P, config: ScoringConfig, device: B::Device) -> Result<Self, ScoreError> {
        config.validate()?;
        let queue = Box::new(DeviceQueue::<B>::new(device.clone()));
        Ok(Self {
            provider,
            config,
            device,
            queue,
        })
    }

    /// Replace the execution queue flushed at the end of each call.
    pub fn with_queue(mut self, queue: impl ExecutionQueue + 'static) -> Self {
        self.queue = Box::new(queue);
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score every example of `source`, returning one `(key, score)` per
    /// input in input order.
    ///
    /// An empty source returns immediately without building a model. Any
    /// error aborts the call; no partial results are returned.
    pub fn score<K, I>(&self, source: I) -> Result<ScoreResult<K>, ScoreError>
    where
        I: IntoIterator<Item = (K, Tensor<B, 2>)>,
    {
        let mut source = source.into_iter().peekable();
        if source.peek().is_none() {
            return Ok(Vec::new());
        }

        let model = self
            .provider
            .get_model(&self.device)
            .map_err(ScoreError::ModelConstruction)?;

        let batch_size = self.config.batch_size;
        let mut results = Vec::new();
        let mut examples: Vec<Tensor<B, 2>> = Vec::with_capacity(batch_size);
        let mut keys: Vec<K> = Vec::with_capacity(batch_size);
        let mut batches = 0usize;

        loop {
            for (key, features) in source.by_ref().take(batch_size) {
                let [num_examples, _] = features.dims();
                if num_examples != 1 {
                    return Err(ScoreError::MalformedExample { num_examples });
                }
                examples.push(features);
                keys.push(key);
            }
            if keys.is_empty() {
                break;
            }

            tracing::trace!(batch = batches, size = keys.len(), "Scoring batch");
            let scores = self.score_batch(&model, examples.drain(..))?;
            if scores.len() != keys.len() {
                return Err(ScoreError::Backend(anyhow::anyhow!(
                    "model returned {} scores for a batch of {}",
                    scores.len(),
                    keys.len()
                )));
            }
            results.extend(keys.drain(..).zip(scores));
            batches += 1;
        }

        self.queue.flush().map_err(ScoreError::Backend)?;

        tracing::debug!(examples = results.len(), batches, "Scored examples");
        Ok(results)
    }

    fn score_batch(
        &self,
        model: &P::Model,
        examples: impl IntoIterator<Item = Tensor<B, 2>>,
    ) -> Result<Vec<f64>, ScoreError> {
        let batch = stack_examples(examples).map_err(ScoreError::Backend)?;
        let num_samples = self.config.num_samples;
        let scores = if self.config.use_log_probability {
            model.reconstruction_log_probability(batch, num_samples)
        } else {
            model.reconstruction_probability(batch, num_samples)
        }
        .map_err(ScoreError::Backend)?;
        tensor_to_vec(scores).map_err(ScoreError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{Entry, RecordingQueue, StubModel, StubProvider};
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn example(values: &[f32]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), [1, values.len()]),
            &Default::default(),
        )
    }

    fn scorer(
        provider: StubProvider,
        batch_size: usize,
        use_log_probability: bool,
    ) -> BatchScorer<TestBackend, StubProvider> {
        let config = ScoringConfig {
            batch_size,
            use_log_probability,
            num_samples: 3,
        };
        BatchScorer::new(provider, config, Default::default()).unwrap()
    }

    #[test]
    fn test_three_examples_batch_of_two() {
        let model = StubModel::new();
        let provider = StubProvider::new(model.clone());
        let scorer = scorer(provider.clone(), 2, false);

        let input = vec![
            ("k1", example(&[1.0, 0.0])),
            ("k2", example(&[2.0, 0.5])),
            ("k3", example(&[3.0, 1.0])),
        ];
        let out = scorer.score(input).unwrap();

        let keys: Vec<&str> = out.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
        assert!((out[0].1 - 1.0).abs() < 1e-6);
        assert!((out[1].1 - 2.5).abs() < 1e-6);
        assert!((out[2].1 - 4.0).abs() < 1e-6);

        let sizes: Vec<usize> = model.calls().iter().map(|c| c.batch_size).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(provider.constructions(), 1);
    }

    #[test]
    fn test_empty_source_builds_no_model() {
        let provider = StubProvider::new(StubModel::new());
        let queue = RecordingQueue::new();
        let scorer = scorer(provider.clone(), 4, true).with_queue(queue.clone());

        let out = scorer
            .score(Vec::<(u32, Tensor<TestBackend, 2>)>::new())
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(provider.constructions(), 0);
        assert_eq!(queue.flushes(), 0);
    }

    #[test]
    fn test_log_probability_routes_to_log_entry() {
        let model = StubModel::new();
        let scorer = scorer(StubProvider::new(model.clone()), 8, true);

        let out = scorer.score(vec![(7u32, example(&[2.0, 2.0]))]).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0].1 + 4.0).abs() < 1e-6, "log entry negates row sum");

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].entry, Entry::LogProbability);
        assert_eq!(calls[0].num_samples, 3);
    }

    #[test]
    fn test_malformed_example_aborts() {
        let provider = StubProvider::new(StubModel::new());
        let scorer = scorer(provider, 2, false);

        let two_rows: Tensor<TestBackend, 2> = Tensor::from_data(
            TensorData::new(vec![1.0_f32, 2.0, 3.0, 4.0], [2, 2]),
            &Default::default(),
        );
        let input = vec![
            ("a", example(&[1.0, 1.0])),
            ("b", example(&[1.0, 1.0])),
            ("c", two_rows),
        ];

        match scorer.score(input) {
            Err(ScoreError::MalformedExample { num_examples }) => assert_eq!(num_examples, 2),
            other => panic!("expected MalformedExample, got {other:?}"),
        }
    }

    #[test]
    fn test_provider_failure_is_model_construction() {
        let scorer = scorer(StubProvider::failing(), 2, false);
        let err = scorer.score(vec![("a", example(&[1.0]))]).unwrap_err();
        assert!(matches!(err, ScoreError::ModelConstruction(_)), "got {err:?}");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ScoringConfig {
            batch_size: 0,
            ..Default::default()
        };
        let result = BatchScorer::<TestBackend, _>::new(
            StubProvider::new(StubModel::new()),
            config,
            Default::default(),
        );
        assert!(matches!(result, Err(ScoreError::InvalidConfig(_))));
    }
}
