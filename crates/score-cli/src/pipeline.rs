//! Model bundle creation, partitioned scoring, and score summaries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use burn::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;

use scoring::{BatchScorer, ScoringConfig, VaeModelProvider};
use vae::{ModelBroadcast, ReconstructionDistribution, VaeConfig};

use crate::config::{load_score_toml, resolve, ScoreOverrides, ScoreToml};
use crate::records::{read_jsonl, write_jsonl, ExampleRecord, ScoreRecord};
use crate::summary::ScoreSummary;

#[cfg(feature = "wgpu")]
pub type ScoreBackend = burn::backend::Wgpu;
#[cfg(not(feature = "wgpu"))]
pub type ScoreBackend = burn::backend::NdArray<f32>;

/// Arguments for the `init` subcommand.
#[derive(Debug)]
pub struct InitArgs {
    /// Directory to write `config.json` and `params.bin` into.
    pub output_dir: PathBuf,
    pub n_in: usize,
    pub n_latent: usize,
    /// Encoder hidden widths; the decoder mirrors them.
    pub hidden: Vec<usize>,
    pub distribution: ReconstructionDistribution,
    /// Backend RNG seed for reproducible weights.
    pub seed: Option<u64>,
}

/// Arguments for the `score` subcommand.
#[derive(Debug)]
pub struct ScoreArgs {
    /// Optional score config TOML file.
    pub config: Option<PathBuf>,
    /// Directory holding the model bundle.
    pub model_dir: PathBuf,
    /// Input JSONL of keyed examples.
    pub input: PathBuf,
    /// Output JSONL of keyed scores.
    pub output: PathBuf,
    pub overrides: ScoreOverrides,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    /// Score JSONL produced by `score`.
    pub input: PathBuf,
    /// How many of the lowest-scoring keys to list.
    pub lowest: usize,
    /// Output as JSON instead of human-readable text.
    pub json: bool,
}

/// Write a randomly-initialized model bundle (no training).
pub fn run_init(args: InitArgs) -> anyhow::Result<()> {
    let decoder_sizes: Vec<usize> = args.hidden.iter().rev().copied().collect();
    let config = VaeConfig::new(args.n_in, args.n_latent)
        .with_encoder_layer_sizes(args.hidden)
        .with_decoder_layer_sizes(decoder_sizes)
        .with_distribution(args.distribution);
    config.validate()?;

    if let Some(seed) = args.seed {
        ScoreBackend::seed(seed);
    }
    let device = Default::default();
    let model = config.init::<ScoreBackend>(&device);

    ModelBroadcast::from_model(&config, model)?.save_dir(&args.output_dir)?;
    tracing::info!(
        n_in = config.n_in,
        n_latent = config.n_latent,
        distribution = ?config.distribution,
        dir = %args.output_dir.display(),
        "Initialized model bundle"
    );
    Ok(())
}

/// Score a keyed example file partition by partition and write the scores.
pub async fn run_score(args: ScoreArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config
    let toml = match &args.config {
        Some(path) => load_score_toml(path)?,
        None => ScoreToml::default(),
    };
    let (scoring, pipeline) = resolve(toml, &args.overrides)?;
    tracing::info!(
        batch_size = scoring.batch_size,
        use_log_probability = scoring.use_log_probability,
        num_samples = scoring.num_samples,
        partitions = pipeline.partitions,
        concurrency = pipeline.concurrency,
        "Scoring configuration"
    );

    // 2. Load model bundle; parse the config once up front to fail fast
    let broadcast = ModelBroadcast::load_dir(&args.model_dir)?;
    broadcast.config()?;

    // 3. Read and partition input
    let records: Vec<ExampleRecord> = read_jsonl(&args.input)?;
    let total = records.len();
    let partitions = split_partitions(records, pipeline.partitions);

    // 4. Score partitions in parallel, one scorer each
    let pb = ProgressBar::new(partitions.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} partitions {msg}")
            .expect("valid progress bar template")
            .progress_chars("=> "),
    );

    let semaphore = Arc::new(Semaphore::new(pipeline.concurrency));
    let mut handles = Vec::with_capacity(partitions.len());
    for (index, partition) in partitions.into_iter().enumerate() {
        let permit = semaphore.clone().acquire_owned().await?;
        let provider = VaeModelProvider::new(broadcast.clone());
        let config = scoring.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            score_partition(index, partition, provider, config)
        }));
    }

    let mut scores = Vec::with_capacity(total);
    for handle in handles {
        scores.extend(handle.await??);
        pb.inc(1);
    }
    pb.finish_with_message("done");

    // 5. Write output
    write_jsonl(&args.output, &scores)?;
    tracing::info!(
        examples = scores.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        output = %args.output.display(),
        "Scoring complete"
    );
    Ok(())
}

/// Score one partition with its own scorer and model.
fn score_partition(
    index: usize,
    records: Vec<ExampleRecord>,
    provider: VaeModelProvider,
    config: ScoringConfig,
) -> anyhow::Result<Vec<ScoreRecord>> {
    let device: <ScoreBackend as Backend>::Device = Default::default();
    let source = records
        .into_iter()
        .map(|r| {
            let tensor = r
                .features
                .to_tensor::<ScoreBackend>(&device)
                .with_context(|| format!("example {}", r.key))?;
            Ok((r.key, tensor))
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .with_context(|| format!("partition {index}: invalid features"))?;

    let scorer = BatchScorer::<ScoreBackend, _>::new(provider, config, device)?;
    let scored = scorer
        .score(source)
        .with_context(|| format!("partition {index} failed"))?;
    tracing::debug!(partition = index, examples = scored.len(), "Partition scored");

    Ok(scored
        .into_iter()
        .map(|(key, score)| ScoreRecord { key, score })
        .collect())
}

/// Split into at most `partitions` contiguous, order-preserving chunks.
fn split_partitions<T>(records: Vec<T>, partitions: usize) -> Vec<Vec<T>> {
    let chunk = records.len().div_ceil(partitions.max(1)).max(1);
    let mut iter = records.into_iter().peekable();
    let mut out = Vec::new();
    while iter.peek().is_some() {
        out.push(iter.by_ref().take(chunk).collect());
    }
    out
}

/// Print count/min/max/mean and the most anomalous keys of a score file.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let scores: Vec<ScoreRecord> = read_jsonl(&args.input)?;
    let summary = ScoreSummary::from_scores(&scores, args.lowest);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.6}"));
    println!("Scores:  {}", summary.count);
    println!("Min:     {}", fmt(summary.min));
    println!("Max:     {}", fmt(summary.max));
    println!("Mean:    {}", fmt(summary.mean));
    if !summary.lowest.is_empty() {
        println!("Lowest {}:", summary.lowest.len());
        for record in &summary.lowest {
            println!("  {:>14.6}  {}", record.score, record.key);
        }
    }
    Ok(())
}
