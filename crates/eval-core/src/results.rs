//! Result types written by the evaluation CLI.

use meta_eval::EvalSummary;
use serde::{Deserialize, Serialize};

/// One partition's evaluation, with enough context to reproduce the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    /// ISO 8601 timestamp of when the evaluation was run.
    pub timestamp: String,
    /// Path to the backbone checkpoint.
    pub checkpoint: String,
    /// Partition name (e.g. "val", "test").
    pub partition: String,
    /// Classes per episode.
    pub n_ways: usize,
    /// Support samples per class.
    pub k_shots: usize,
    /// Query samples per class.
    pub q_queries: usize,
    /// Base sampling seed.
    pub seed: u64,
    /// Base learner name ("r2d2" or "centroid").
    pub classifier: String,
    /// Backbone output fed to the learner ("embeddings" or "logits").
    pub feature_source: String,
    /// Episodes scored.
    pub episodes: usize,
    /// Mean query accuracy across episodes.
    pub mean_accuracy: f64,
    /// Sample standard deviation of per-episode accuracy.
    pub std: f64,
    /// Half-width of the 95% confidence interval of the mean.
    pub ci95: f64,
    /// Wall-clock seconds for the partition.
    pub elapsed_secs: f64,
    /// Per-episode accuracies, in episode order.
    pub per_episode: Vec<f64>,
}

impl EvalResult {
    pub fn from_summary(
        summary: &EvalSummary,
        checkpoint: String,
        partition: String,
        n_ways: usize,
        k_shots: usize,
        q_queries: usize,
        seed: u64,
        classifier: String,
        feature_source: String,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            checkpoint,
            partition,
            n_ways,
            k_shots,
            q_queries,
            seed,
            classifier,
            feature_source,
            episodes: summary.episodes,
            mean_accuracy: summary.mean_accuracy,
            std: summary.std,
            ci95: summary.ci95,
            elapsed_secs: summary.elapsed_secs,
            per_episode: summary.per_episode.clone(),
        }
    }
}
