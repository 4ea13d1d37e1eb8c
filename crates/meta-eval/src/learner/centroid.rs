//! Nearest-centroid base learner.

use crate::episode::Episode;

/// Classifies each query by the nearest class mean of the support set.
#[derive(Debug, Clone, Default)]
pub struct CentroidLearner;

impl CentroidLearner {
    pub fn new() -> Self {
        Self
    }

    /// Predicted episode-local label per query row.
    pub fn predict(&self, episode: &Episode) -> Vec<usize> {
        let n_classes = episode
            .support_labels
            .iter()
            .max()
            .map_or(0, |&l| l + 1);
        let dim = episode.dim();

        let mut centroids = vec![vec![0.0f64; dim]; n_classes];
        let mut counts = vec![0usize; n_classes];
        for (row, &label) in episode.support.iter().zip(&episode.support_labels) {
            for (acc, &v) in centroids[label].iter_mut().zip(row) {
                *acc += v as f64;
            }
            counts[label] += 1;
        }
        for (centroid, &count) in centroids.iter_mut().zip(&counts) {
            if count > 0 {
                for v in centroid.iter_mut() {
                    *v /= count as f64;
                }
            }
        }

        episode
            .query
            .iter()
            .map(|row| {
                centroids
                    .iter()
                    .enumerate()
                    .map(|(label, centroid)| (label, squared_distance(row, centroid)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map_or(0, |(label, _)| label)
            })
            .collect()
    }
}

fn squared_distance(row: &[f32], centroid: &[f64]) -> f64 {
    row.iter()
        .zip(centroid)
        .map(|(&a, &b)| {
            let d = a as f64 - b;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_centroid_wins() {
        let episode = Episode {
            index: 0,
            support: vec![
                vec![0.0, 0.0],
                vec![0.2, 0.0],
                vec![10.0, 10.0],
                vec![10.2, 10.0],
            ],
            support_labels: vec![0, 0, 1, 1],
            query: vec![vec![0.5, 0.5], vec![9.0, 9.5]],
            query_labels: vec![0, 1],
        };

        let learner = CentroidLearner::new();
        assert_eq!(learner.predict(&episode), vec![0, 1]);
    }

    #[test]
    fn test_centroid_is_class_mean() {
        // Queries sit exactly on the mean of each class.
        let episode = Episode {
            index: 0,
            support: vec![
                vec![0.0, 2.0],
                vec![2.0, 0.0],
                vec![8.0, 8.0],
                vec![10.0, 10.0],
            ],
            support_labels: vec![0, 0, 1, 1],
            query: vec![vec![1.0, 1.0], vec![9.0, 9.0]],
            query_labels: vec![0, 1],
        };

        let learner = CentroidLearner::new();
        assert_eq!(learner.predict(&episode), vec![0, 1]);
    }
}
