//! Episode base learners run on top of frozen features.

mod centroid;
mod ridge;

pub use centroid::CentroidLearner;
pub use ridge::{RidgeConfig, RidgeLearner};

use crate::episode::Episode;

/// The base learner fitted from scratch inside every episode.
#[derive(Debug, Clone)]
pub enum Learner {
    Ridge(RidgeLearner),
    Centroid(CentroidLearner),
}

impl Learner {
    pub fn ridge(config: &RidgeConfig) -> Self {
        Self::Ridge(RidgeLearner::new(config))
    }

    pub fn centroid() -> Self {
        Self::Centroid(CentroidLearner::new())
    }

    /// Predicted episode-local label per query row.
    pub fn predict(&self, episode: &Episode) -> Vec<usize> {
        match self {
            Self::Ridge(learner) => learner.predict(episode),
            Self::Centroid(learner) => learner.predict(episode),
        }
    }

    /// One calibration step on this episode, where the learner supports it.
    /// Returns the pre-step query loss.
    pub fn adapt(&mut self, episode: &Episode) -> Option<f64> {
        match self {
            Self::Ridge(learner) => Some(learner.adapt(episode)),
            Self::Centroid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_class_episode() -> Episode {
        Episode {
            index: 0,
            support: vec![vec![0.0, 1.0], vec![1.0, 0.0]],
            support_labels: vec![0, 1],
            query: vec![vec![0.0, 0.9], vec![0.9, 0.0]],
            query_labels: vec![0, 1],
        }
    }

    #[test]
    fn test_both_variants_predict() {
        let episode = two_class_episode();
        for learner in [Learner::ridge(&RidgeConfig::default()), Learner::centroid()] {
            let predictions = learner.predict(&episode);
            assert_eq!(predictions, vec![0, 1]);
        }
    }

    #[test]
    fn test_centroid_adapt_is_noop() {
        let mut learner = Learner::centroid();
        assert!(learner.adapt(&two_class_episode()).is_none());
    }

    #[test]
    fn test_ridge_adapt_returns_loss() {
        let mut learner = Learner::ridge(&RidgeConfig::default());
        let loss = learner.adapt(&two_class_episode());
        assert!(loss.is_some_and(|l| l.is_finite() && l > 0.0));
    }
}
