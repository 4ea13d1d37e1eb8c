mod config;
mod pipeline;
pub mod results;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::{EvalArgs, ExtractFeaturesArgs, SummaryArgs};

/// fewshot-eval: episodic few-shot evaluation of a frozen backbone.
#[derive(Parser)]
#[command(name = "fewshot-eval", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for evaluation, feature precomputation, and inspection.
#[derive(Subcommand)]
enum Command {
    /// Evaluate a backbone checkpoint over sampled few-shot episodes.
    Eval {
        /// Path to the backbone checkpoint (.mpk).
        #[arg(long)]
        checkpoint: PathBuf,
        /// Directory holding partition Parquet files ({partition}.parquet).
        #[arg(long)]
        data_dir: PathBuf,
        /// Path to an eval config TOML file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Partitions to evaluate, in order.
        #[arg(long, value_delimiter = ',', default_values_t = vec!["val".to_string(), "test".to_string()])]
        partitions: Vec<String>,
        /// Override the number of episodes per partition.
        #[arg(long)]
        episodes: Option<usize>,
        /// Override classes per episode.
        #[arg(long)]
        n_ways: Option<usize>,
        /// Override support samples per class.
        #[arg(long)]
        k_shots: Option<usize>,
        /// Override query samples per class.
        #[arg(long)]
        q_queries: Option<usize>,
        /// Override the base sampling seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Base learner: "r2d2" or "centroid".
        #[arg(long, default_value = "r2d2")]
        classifier: String,
        /// Backbone output fed to the learner: "embeddings" or "logits".
        #[arg(long, default_value = "embeddings")]
        feature_source: String,
        /// Override the calibration step size used on the val partition.
        #[arg(long)]
        adapt_lr: Option<f64>,
        /// Backbone forward-pass batch size.
        #[arg(long, default_value_t = 128)]
        batch_size: usize,
        /// Background episode-assembly threads.
        #[arg(long, default_value_t = 2)]
        num_workers: usize,
        /// Override the number of base-training classes in the head.
        #[arg(long)]
        num_classes: Option<usize>,
        /// Directory of precomputed feature caches ({partition}_features.parquet).
        #[arg(long)]
        features_dir: Option<PathBuf>,
        /// Path to write JSON evaluation results.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Precompute backbone features for a partition into a Parquet cache.
    ExtractFeatures {
        /// Path to the backbone checkpoint (.mpk).
        #[arg(long)]
        checkpoint: PathBuf,
        /// Path to the partition Parquet file.
        #[arg(long)]
        input: PathBuf,
        /// Path for the output feature-cache Parquet file.
        #[arg(long)]
        output: PathBuf,
        /// Path to an eval config TOML file (for the backbone section).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Backbone forward-pass batch size.
        #[arg(long, default_value_t = 128)]
        batch_size: usize,
        /// Override the number of base-training classes in the head.
        #[arg(long)]
        num_classes: Option<usize>,
    },
    /// Print statistics from a partition Parquet file.
    Summary {
        /// Path to the partition Parquet file.
        #[arg(long)]
        input: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Eval {
            checkpoint,
            data_dir,
            config,
            partitions,
            episodes,
            n_ways,
            k_shots,
            q_queries,
            seed,
            classifier,
            feature_source,
            adapt_lr,
            batch_size,
            num_workers,
            num_classes,
            features_dir,
            output,
        } => pipeline::run_eval(EvalArgs {
            checkpoint,
            data_dir,
            config,
            partitions,
            episodes,
            n_ways,
            k_shots,
            q_queries,
            seed,
            classifier,
            feature_source,
            adapt_lr,
            batch_size,
            num_workers,
            num_classes,
            features_dir,
            output,
        }),
        Command::ExtractFeatures {
            checkpoint,
            input,
            output,
            config,
            batch_size,
            num_classes,
        } => pipeline::run_extract_features(ExtractFeaturesArgs {
            checkpoint,
            input,
            output,
            config,
            batch_size,
            num_classes,
        }),
        Command::Summary { input, json } => pipeline::run_summary(SummaryArgs { input, json }),
    }
}
