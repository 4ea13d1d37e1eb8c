//! Episodic meta-evaluation: few-shot episode sampling, closed-form base
//! learners over frozen features, and accuracy aggregation across episodes.

pub mod episode;
pub mod eval;
pub mod learner;
pub mod prefetch;
pub mod sampler;
pub mod stats;

pub use episode::Episode;
pub use eval::{meta_test, EvalOptions, EvalSummary};
pub use learner::{CentroidLearner, Learner, RidgeConfig, RidgeLearner};
pub use sampler::{EpisodeConfig, EpisodeSampler};
