//! Data types for partition samples, feature records, and the class index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single labeled image from a dataset partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Unique sample ID within the partition.
    pub sample_id: u64,
    /// Human-readable class name (e.g. WordNet synset).
    pub class_name: String,
    /// Integer class label within the partition.
    pub class_id: u32,
    /// Number of image channels.
    pub channels: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Image width in pixels.
    pub width: u32,
    /// Preprocessed pixel values, CHW order, length = channels * height * width.
    pub image: Vec<f32>,
}

impl SampleRecord {
    /// Image shape as `(channels, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.channels as usize,
            self.height as usize,
            self.width as usize,
        )
    }
}

/// Precomputed backbone outputs for one sample.
///
/// The backbone is frozen, so `sample_id -> (embedding, logits)` is
/// deterministic and safe to persist across runs.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    /// ID of the sample these features were extracted from.
    pub sample_id: u64,
    /// Class label, copied from the partition for convenience.
    pub class_id: u32,
    /// Penultimate-layer embedding.
    pub embedding: Vec<f32>,
    /// Classifier-head logits.
    pub logits: Vec<f32>,
}

/// Quick statistics for a partition file.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    /// Total number of samples.
    pub total_samples: usize,
    /// Number of distinct classes.
    pub num_classes: usize,
    /// Sample count per class, keyed by class ID.
    pub class_counts: BTreeMap<u32, usize>,
    /// Image shape `(channels, height, width)` of the first sample.
    pub image_shape: (usize, usize, usize),
}

/// Groups sample indices by class for episode sampling.
///
/// Uses a `BTreeMap` so `classes()` iterates in a stable order — episode
/// sampling must be reproducible for a fixed seed.
#[derive(Debug, Clone)]
pub struct ClassIndex {
    by_class: BTreeMap<u32, Vec<usize>>,
}

impl ClassIndex {
    /// Build the index from class IDs, one per sample, in sample order.
    pub fn build(class_ids: &[u32]) -> Self {
        let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (i, &class_id) in class_ids.iter().enumerate() {
            by_class.entry(class_id).or_default().push(i);
        }
        Self { by_class }
    }

    /// Build the index from partition records.
    pub fn from_records(records: &[SampleRecord]) -> Self {
        let ids: Vec<u32> = records.iter().map(|r| r.class_id).collect();
        Self::build(&ids)
    }

    /// Class IDs in ascending order.
    pub fn classes(&self) -> Vec<u32> {
        self.by_class.keys().copied().collect()
    }

    /// Sample indices belonging to a class. Empty slice for unknown classes.
    pub fn samples_of(&self, class_id: u32) -> &[usize] {
        self.by_class
            .get(&class_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Number of distinct classes.
    pub fn num_classes(&self) -> usize {
        self.by_class.len()
    }

    /// Size of the smallest class. Zero if the index is empty.
    pub fn min_class_size(&self) -> usize {
        self.by_class.values().map(|v| v.len()).min().unwrap_or(0)
    }
}
