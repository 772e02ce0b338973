use crate::scorer::ScoreError;

/// Scoring configuration loaded from TOML.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ScoringConfig {
    /// Examples per scoring round.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Score with log-probability instead of raw probability.
    #[serde(default = "default_use_log_probability")]
    pub use_log_probability: bool,

    /// Latent samples the model draws per example to estimate its score.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
}

fn default_batch_size() -> usize {
    64
}
fn default_use_log_probability() -> bool {
    true
}
fn default_num_samples() -> usize {
    5
}

impl ScoringConfig {
    /// Reject a zero batch size or sample count.
    pub fn validate(&self) -> Result<(), ScoreError> {
        if self.batch_size == 0 {
            return Err(ScoreError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.num_samples == 0 {
            return Err(ScoreError::InvalidConfig("num_samples must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            use_log_probability: default_use_log_probability(),
            num_samples: default_num_samples(),
        }
    }
}
