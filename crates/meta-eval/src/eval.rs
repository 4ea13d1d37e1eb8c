//! The meta-test loop: stream episodes, fit the base learner in each,
//! aggregate query accuracy across the run.

use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::learner::Learner;
use crate::prefetch::Prefetcher;
use crate::sampler::EpisodeSampler;
use crate::stats::{accuracy, confidence_interval95, mean_std};

/// Run-level evaluation knobs.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Number of episodes to score.
    pub episodes: usize,
    /// L2-normalize feature rows before fitting.
    pub normalize: bool,
    /// Take one calibration step per episode (ridge only). Episodes are
    /// scored before the step, so accuracy never sees its own update.
    pub adapt: bool,
    /// Background episode-assembly threads.
    pub num_workers: usize,
    /// Render a progress bar.
    pub progress: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            episodes: 1000,
            normalize: true,
            adapt: false,
            num_workers: 2,
            progress: false,
        }
    }
}

/// Aggregated result of one meta-test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    /// Episodes scored.
    pub episodes: usize,
    /// Mean query accuracy across episodes.
    pub mean_accuracy: f64,
    /// Sample standard deviation of per-episode accuracy.
    pub std: f64,
    /// Half-width of the 95% confidence interval of the mean.
    pub ci95: f64,
    /// Wall-clock seconds for the run.
    pub elapsed_secs: f64,
    /// Per-episode accuracies, in episode order.
    pub per_episode: Vec<f64>,
}

/// Score `options.episodes` episodes drawn by `sampler` with `learner`.
///
/// Episodes are consumed in index order, so results depend only on the
/// sampler seed and learner state, never on worker scheduling.
pub fn meta_test(
    sampler: Arc<EpisodeSampler>,
    learner: &mut Learner,
    options: &EvalOptions,
) -> EvalSummary {
    let start = Instant::now();
    let bar = if options.progress {
        let bar = ProgressBar::new(options.episodes as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} episodes ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        Some(bar)
    } else {
        None
    };

    let mut per_episode = Vec::with_capacity(options.episodes);
    for mut episode in Prefetcher::new(sampler, options.episodes, options.num_workers) {
        if options.normalize {
            episode.l2_normalize();
        }

        let predictions = learner.predict(&episode);
        per_episode.push(accuracy(&predictions, &episode.query_labels));

        if options.adapt {
            if let Some(loss) = learner.adapt(&episode) {
                tracing::debug!(episode = episode.index, loss, "calibration step");
            }
        }

        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let (mean_accuracy, std) = mean_std(&per_episode);
    let ci95 = confidence_interval95(std, per_episode.len());
    let elapsed_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        episodes = per_episode.len(),
        mean_accuracy,
        std,
        ci95,
        elapsed_secs,
        "meta-test complete"
    );

    EvalSummary {
        episodes: per_episode.len(),
        mean_accuracy,
        std,
        ci95,
        elapsed_secs,
        per_episode,
    }
}
