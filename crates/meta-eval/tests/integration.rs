//! End-to-end meta-evaluation over synthetic features.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use meta_eval::{meta_test, EpisodeConfig, EpisodeSampler, EvalOptions, Learner, RidgeConfig};

/// Well-separated Gaussian clusters, one per class.
fn make_features(
    classes: u32,
    per_class: usize,
    dim: usize,
    noise: f32,
) -> (Vec<Vec<f32>>, Vec<u32>) {
    let mut rng = StdRng::seed_from_u64(99);
    let mut features = Vec::new();
    let mut labels = Vec::new();
    for c in 0..classes {
        for _ in 0..per_class {
            let row: Vec<f32> = (0..dim)
                .map(|d| {
                    let center = if d == c as usize % dim { 4.0 } else { 0.0 };
                    center + rng.gen_range(-noise..noise)
                })
                .collect();
            features.push(row);
            labels.push(c);
        }
    }
    (features, labels)
}

fn sampler(seed: u64) -> Arc<EpisodeSampler> {
    let (features, labels) = make_features(12, 25, 12, 0.4);
    let config = EpisodeConfig {
        n_ways: 5,
        k_shots: 5,
        q_queries: 10,
        seed,
    };
    Arc::new(EpisodeSampler::new(config, features, &labels).unwrap())
}

#[test]
fn test_full_run_is_deterministic_across_worker_counts() {
    let base = EvalOptions {
        episodes: 40,
        ..Default::default()
    };

    let mut summaries = Vec::new();
    for num_workers in [1, 2, 6] {
        let options = EvalOptions {
            num_workers,
            ..base.clone()
        };
        let mut learner = Learner::ridge(&RidgeConfig::default());
        summaries.push(meta_test(sampler(21), &mut learner, &options));
    }

    for s in &summaries[1..] {
        assert_eq!(s.per_episode, summaries[0].per_episode);
        assert_eq!(s.mean_accuracy, summaries[0].mean_accuracy);
    }
}

#[test]
fn test_ridge_and_centroid_both_solve_easy_clusters() {
    let options = EvalOptions {
        episodes: 30,
        ..Default::default()
    };

    for mut learner in [Learner::ridge(&RidgeConfig::default()), Learner::centroid()] {
        let summary = meta_test(sampler(4), &mut learner, &options);
        assert!(
            summary.mean_accuracy > 0.9,
            "accuracy {} too low for easy clusters",
            summary.mean_accuracy
        );
        assert!(summary.ci95 < 0.1);
    }
}

#[test]
fn test_more_episodes_tighter_interval() {
    let mut last_ci = f64::INFINITY;
    for episodes in [20, 80, 320] {
        let options = EvalOptions {
            episodes,
            ..Default::default()
        };
        // Moderate noise so per-episode accuracy actually varies.
        let (features, labels) = make_features(10, 30, 10, 2.5);
        let config = EpisodeConfig {
            n_ways: 5,
            k_shots: 1,
            q_queries: 8,
            seed: 17,
        };
        let sampler = Arc::new(EpisodeSampler::new(config, features, &labels).unwrap());
        let mut learner = Learner::ridge(&RidgeConfig::default());
        let summary = meta_test(sampler, &mut learner, &options);

        assert!(
            summary.ci95 < last_ci,
            "ci95 {} did not shrink below {last_ci} at {episodes} episodes",
            summary.ci95
        );
        last_ci = summary.ci95;
    }
}

#[test]
fn test_adaptation_then_frozen_evaluation() {
    // Calibrate on one split, then score another with adaptation off.
    let adapt_options = EvalOptions {
        episodes: 50,
        adapt: true,
        ..Default::default()
    };
    let frozen_options = EvalOptions {
        episodes: 50,
        adapt: false,
        ..Default::default()
    };

    let mut learner = Learner::ridge(&RidgeConfig::default());
    meta_test(sampler(100), &mut learner, &adapt_options);

    let calibrated = match &learner {
        Learner::Ridge(r) => (r.scale, r.bias, r.lambda),
        Learner::Centroid(_) => unreachable!(),
    };

    let summary = meta_test(sampler(200), &mut learner, &frozen_options);
    assert!(summary.mean_accuracy > 0.9);

    // Frozen evaluation must leave the calibration untouched.
    let after = match &learner {
        Learner::Ridge(r) => (r.scale, r.bias, r.lambda),
        Learner::Centroid(_) => unreachable!(),
    };
    assert_eq!(calibrated, after);
}
