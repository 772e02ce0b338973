//! Mock implementations of scoring traits for testing without a trained model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use burn::prelude::*;

use crate::backend::ExecutionQueue;
use crate::scorer::{ModelProvider, ReconstructionModel};

// ---------------------------------------------------------------------------
// StubModel
// ---------------------------------------------------------------------------

/// Which scoring entry point a model call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Probability,
    LogProbability,
}

/// One recorded model invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCall {
    pub entry: Entry,
    /// Rows in the stacked batch.
    pub batch_size: usize,
    pub num_samples: usize,
}

/// Deterministic model: probability = row sum, log-probability = −row sum.
///
/// Clones share the call log, so a test can keep one handle and give the
/// other to a provider.
#[derive(Debug, Clone, Default)]
pub struct StubModel {
    calls: Arc<Mutex<Vec<ModelCall>>>,
    fail: bool,
}

impl StubModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A model whose every call returns an error.
    pub fn failing() -> Self {
        Self {
            calls: Arc::default(),
            fail: true,
        }
    }

    /// Calls recorded so far, in order.
    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record<B: Backend>(
        &self,
        entry: Entry,
        x: &Tensor<B, 2>,
        num_samples: usize,
    ) -> anyhow::Result<()> {
        let [batch_size, _] = x.dims();
        self.calls
            .lock()
            .map_err(|e| anyhow::anyhow!("stub call log poisoned: {e}"))?
            .push(ModelCall {
                entry,
                batch_size,
                num_samples,
            });
        if self.fail {
            anyhow::bail!("stub model failure");
        }
        Ok(())
    }
}

impl<B: Backend> ReconstructionModel<B> for StubModel {
    fn reconstruction_probability(
        &self,
        x: Tensor<B, 2>,
        num_samples: usize,
    ) -> anyhow::Result<Tensor<B, 1>> {
        self.record(Entry::Probability, &x, num_samples)?;
        Ok(x.sum_dim(1).squeeze::<1>(1))
    }

    fn reconstruction_log_probability(
        &self,
        x: Tensor<B, 2>,
        num_samples: usize,
    ) -> anyhow::Result<Tensor<B, 1>> {
        self.record(Entry::LogProbability, &x, num_samples)?;
        Ok(x.sum_dim(1).squeeze::<1>(1).neg())
    }
}

// ---------------------------------------------------------------------------
// StubProvider
// ---------------------------------------------------------------------------

/// Provider handing out clones of a [`StubModel`] and counting constructions.
#[derive(Debug, Clone)]
pub struct StubProvider {
    model: StubModel,
    constructions: Arc<AtomicUsize>,
    fail: bool,
}

impl StubProvider {
    pub fn new(model: StubModel) -> Self {
        Self {
            model,
            constructions: Arc::default(),
            fail: false,
        }
    }

    /// A provider that fails every construction (still counted).
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(StubModel::new())
        }
    }

    /// Number of `get_model` calls so far, across all clones.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl<B: Backend> ModelProvider<B> for StubProvider {
    type Model = StubModel;

    fn get_model(&self, _device: &B::Device) -> anyhow::Result<StubModel> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("stub provider failure");
        }
        Ok(self.model.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingQueue
// ---------------------------------------------------------------------------

/// Execution queue that counts flushes.
#[derive(Debug, Clone, Default)]
pub struct RecordingQueue {
    flushes: Arc<AtomicUsize>,
    fail: bool,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue whose flush fails (still counted).
    pub fn failing() -> Self {
        Self {
            flushes: Arc::default(),
            fail: true,
        }
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl ExecutionQueue for RecordingQueue {
    fn flush(&self) -> anyhow::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("queue flush failed");
        }
        Ok(())
    }
}
