//! Parquet I/O for few-shot dataset partitions and feature caches.
//!
//! A partition file holds preprocessed images (CHW f32) with class labels;
//! a feature cache holds precomputed backbone outputs (embeddings + logits)
//! keyed by sample ID. Both are single-batch Parquet files.

pub mod reader;
pub mod types;
pub mod writer;

pub use reader::{FeatureCacheReader, PartitionReader};
pub use types::{ClassIndex, FeatureRecord, PartitionSummary, SampleRecord};
pub use writer::{FeatureCacheWriter, PartitionWriter};
