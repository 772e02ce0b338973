mod config;
mod pipeline;
mod records;
mod summary;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use config::ScoreOverrides;
use pipeline::{InitArgs, ScoreArgs, SummaryArgs};
use vae::ReconstructionDistribution;

/// vae-score: batch reconstruction-probability scoring with a VAE.
#[derive(Parser)]
#[command(name = "vae-score", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for bundle creation, scoring, and score summaries.
#[derive(Subcommand)]
enum Command {
    /// Write a randomly-initialized model bundle (config.json + params.bin).
    Init {
        /// Output directory for the bundle.
        #[arg(long)]
        output_dir: PathBuf,
        /// Input feature width.
        #[arg(long)]
        n_in: usize,
        /// Latent dimension.
        #[arg(long, default_value_t = 8)]
        n_latent: usize,
        /// Encoder hidden widths, comma-separated. The decoder mirrors them.
        #[arg(long, value_delimiter = ',', default_value = "64")]
        hidden: Vec<usize>,
        /// Reconstruction distribution p(x|z).
        #[arg(long, value_enum, default_value_t = DistributionArg::Gaussian)]
        distribution: DistributionArg,
        /// Seed for reproducible weight initialization.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score a JSONL file of keyed examples.
    Score {
        /// Path to score config TOML file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Model bundle directory written by `init`.
        #[arg(long)]
        model_dir: PathBuf,
        /// Input JSONL (`{"key": ..., "features": [...]}` per line).
        #[arg(long)]
        input: PathBuf,
        /// Output JSONL (`{"key": ..., "score": ...}` per line).
        #[arg(long)]
        output: PathBuf,
        /// Override examples per batch.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override whether to emit log-probabilities (true) or probabilities (false).
        #[arg(long)]
        log_probability: Option<bool>,
        /// Override latent samples per example.
        #[arg(long)]
        num_samples: Option<usize>,
        /// Override the number of input partitions.
        #[arg(long)]
        partitions: Option<usize>,
        /// Override how many partitions are scored at once.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Print statistics from a score JSONL file.
    Summary {
        /// Path to the score JSONL file.
        #[arg(long)]
        input: PathBuf,
        /// Number of lowest-scoring keys to list.
        #[arg(long, default_value_t = 10)]
        lowest: usize,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DistributionArg {
    Bernoulli,
    Gaussian,
}

impl From<DistributionArg> for ReconstructionDistribution {
    fn from(arg: DistributionArg) -> Self {
        match arg {
            DistributionArg::Bernoulli => ReconstructionDistribution::Bernoulli,
            DistributionArg::Gaussian => ReconstructionDistribution::Gaussian,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init {
            output_dir,
            n_in,
            n_latent,
            hidden,
            distribution,
            seed,
        } => pipeline::run_init(InitArgs {
            output_dir,
            n_in,
            n_latent,
            hidden,
            distribution: distribution.into(),
            seed,
        }),
        Command::Score {
            config,
            model_dir,
            input,
            output,
            batch_size,
            log_probability,
            num_samples,
            partitions,
            concurrency,
        } => {
            pipeline::run_score(ScoreArgs {
                config,
                model_dir,
                input,
                output,
                overrides: ScoreOverrides {
                    batch_size,
                    use_log_probability: log_probability,
                    num_samples,
                    partitions,
                    concurrency,
                },
            })
            .await
        }
        Command::Summary {
            input,
            lowest,
            json,
        } => pipeline::run_summary(SummaryArgs {
            input,
            lowest,
            json,
        }),
    }
}
