//! TOML config loading for the scoring CLI.
//!
//! Deserializes `configs/score.toml` which has `[scoring]` and `[pipeline]`
//! sections, then merges with CLI overrides.

use std::path::Path;

use scoring::ScoringConfig;
use serde::Deserialize;

/// Top-level structure matching `configs/score.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct ScoreToml {
    /// Batch scoring parameters.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Partitioning of the input across parallel scorers.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// How the input is split and how many partitions run at once.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    /// Number of contiguous input partitions, each scored independently.
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    /// Maximum partitions scored concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_partitions() -> usize {
    4
}
fn default_concurrency() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            concurrency: default_concurrency(),
        }
    }
}

/// CLI flags that override TOML values when present.
#[derive(Debug, Default, Clone)]
pub struct ScoreOverrides {
    pub batch_size: Option<usize>,
    pub use_log_probability: Option<bool>,
    pub num_samples: Option<usize>,
    pub partitions: Option<usize>,
    pub concurrency: Option<usize>,
}

/// Load and deserialize a `ScoreToml` from a TOML file.
pub fn load_score_toml(path: &Path) -> anyhow::Result<ScoreToml> {
    let contents = std::fs::read_to_string(path)?;
    let config: ScoreToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded score config");
    Ok(config)
}

/// Merge CLI overrides into the TOML config and validate the result.
///
/// Priority chain: serde defaults < TOML values < CLI flags.
pub fn resolve(
    toml: ScoreToml,
    overrides: &ScoreOverrides,
) -> anyhow::Result<(ScoringConfig, PipelineConfig)> {
    let mut scoring = toml.scoring;
    if let Some(n) = overrides.batch_size {
        scoring.batch_size = n;
    }
    if let Some(flag) = overrides.use_log_probability {
        scoring.use_log_probability = flag;
    }
    if let Some(n) = overrides.num_samples {
        scoring.num_samples = n;
    }
    scoring.validate()?;

    let mut pipeline = toml.pipeline;
    if let Some(n) = overrides.partitions {
        pipeline.partitions = n;
    }
    if let Some(n) = overrides.concurrency {
        pipeline.concurrency = n;
    }
    anyhow::ensure!(pipeline.partitions > 0, "partitions must be > 0");
    anyhow::ensure!(pipeline.concurrency > 0, "concurrency must be > 0");

    Ok((scoring, pipeline))
}
