//! Batched feature extraction with a frozen backbone.

use anyhow::Result;
use burn::prelude::*;

use crate::bridge::{images_to_tensor, tensor_to_rows};
use crate::resnet::ResNet12;

/// Which backbone output feeds the episode base learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSource {
    /// Pooled penultimate features.
    Embeddings,
    /// Linear-head logits.
    Logits,
}

impl FeatureSource {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "embeddings" => Ok(Self::Embeddings),
            "logits" => Ok(Self::Logits),
            other => anyhow::bail!(
                "Unknown feature source '{other}' (expected 'embeddings' or 'logits')"
            ),
        }
    }
}

/// Runs a frozen backbone over images in fixed-size batches.
pub struct FeatureExtractor<B: Backend> {
    model: ResNet12<B>,
    device: B::Device,
    batch_size: usize,
}

impl<B: Backend> FeatureExtractor<B> {
    pub fn new(model: ResNet12<B>, device: B::Device, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        Self {
            model,
            device,
            batch_size,
        }
    }

    /// Extract one feature row per image.
    ///
    /// All images must share the `(channels, height, width)` shape. Output
    /// order matches input order.
    pub fn extract(
        &self,
        images: &[Vec<f32>],
        shape: (usize, usize, usize),
        source: FeatureSource,
    ) -> Result<Vec<Vec<f32>>> {
        let mut rows = Vec::with_capacity(images.len());
        for chunk in images.chunks(self.batch_size) {
            let batch = images_to_tensor::<B>(chunk, shape, &self.device);
            let out = match source {
                FeatureSource::Embeddings => self.model.embed(batch),
                FeatureSource::Logits => self.model.forward(batch),
            };
            rows.extend(tensor_to_rows(out)?);
        }
        Ok(rows)
    }

    /// Extract embeddings and logits together, one backbone pass per batch.
    pub fn extract_pair(
        &self,
        images: &[Vec<f32>],
        shape: (usize, usize, usize),
    ) -> Result<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
        let mut embeddings = Vec::with_capacity(images.len());
        let mut logits = Vec::with_capacity(images.len());
        for chunk in images.chunks(self.batch_size) {
            let batch = images_to_tensor::<B>(chunk, shape, &self.device);
            let (emb, log) = self.model.forward_both(batch);
            embeddings.extend(tensor_to_rows(emb)?);
            logits.extend(tensor_to_rows(log)?);
        }
        Ok((embeddings, logits))
    }
}
