//! Numeric backend seams: batch stacking and the execution-queue barrier.

use std::marker::PhantomData;

use burn::prelude::*;

/// Blocking barrier over a backend's queued work.
///
/// Backends that execute eagerly need nothing; the default `flush` is a
/// no-op. Backends that queue kernels asynchronously (GPU) must block until
/// every queued operation has completed.
pub trait ExecutionQueue: Send + Sync {
    /// Block until all queued work has completed.
    fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Queue for eagerly-executing backends. Flushing does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Synchronous;

impl ExecutionQueue for Synchronous {}

/// Queue bound to a burn device; flushing calls `B::sync` on it.
///
/// `sync` is a no-op on CPU backends and drains the command queue on GPU
/// backends, so this is the right default for any `B`.
pub struct DeviceQueue<B: Backend> {
    device: B::Device,
    _backend: PhantomData<fn() -> B>,
}

impl<B: Backend> DeviceQueue<B> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> ExecutionQueue for DeviceQueue<B> {
    fn flush(&self) -> anyhow::Result<()> {
        B::sync(&self.device);
        Ok(())
    }
}

/// Concatenate single-example tensors along the leading dimension.
///
/// Row order follows iteration order. Fails if the input is empty or the
/// feature widths disagree (burn would panic on `cat`).
pub fn stack_examples<B: Backend>(
    examples: impl IntoIterator<Item = Tensor<B, 2>>,
) -> anyhow::Result<Tensor<B, 2>> {
    let examples: Vec<Tensor<B, 2>> = examples.into_iter().collect();
    let Some(first) = examples.first() else {
        anyhow::bail!("cannot stack an empty batch");
    };
    let [_, width] = first.dims();
    for (i, example) in examples.iter().enumerate() {
        let [_, w] = example.dims();
        anyhow::ensure!(
            w == width,
            "example {i} in batch has {w} features, expected {width}"
        );
    }
    Ok(Tensor::cat(examples, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn row(values: &[f32]) -> Tensor<TestBackend, 2> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), [1, values.len()]),
            &Default::default(),
        )
    }

    #[test]
    fn test_stack_preserves_order() {
        let stacked = stack_examples(vec![row(&[1.0, 2.0]), row(&[3.0, 4.0]), row(&[5.0, 6.0])])
            .unwrap();
        assert_eq!(stacked.dims(), [3, 2]);

        let values: Vec<f32> = stacked.into_data().to_vec().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_stack_width_mismatch() {
        let err = stack_examples(vec![row(&[1.0, 2.0]), row(&[3.0])])
            .unwrap_err()
            .to_string();
        assert!(err.contains("example 1"), "unexpected error: {err}");
    }

    #[test]
    fn test_stack_empty() {
        assert!(stack_examples(Vec::<Tensor<TestBackend, 2>>::new()).is_err());
    }

    #[test]
    fn test_queues_flush_ok() {
        assert!(Synchronous.flush().is_ok());
        let queue = DeviceQueue::<TestBackend>::new(Default::default());
        assert!(queue.flush().is_ok());
    }
}
