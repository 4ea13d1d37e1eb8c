//! Frozen convolutional backbone for few-shot evaluation.
//!
//! Provides the ResNet-12 architecture as a burn `Module`, checkpoint
//! load/save, and batched feature extraction producing either penultimate
//! embeddings or classifier logits.

pub mod bridge;
pub mod extract;
pub mod resnet;

pub use extract::{FeatureExtractor, FeatureSource};
pub use resnet::{ResNet12, ResNet12Config};
