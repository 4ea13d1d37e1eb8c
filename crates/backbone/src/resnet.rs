//! ResNet-12 backbone used by few-shot classification benchmarks.
//!
//! Four residual stages of widths 64/160/320/640. Each stage is one basic
//! block of three 3x3 conv + batch-norm + leaky ReLU layers with a 1x1
//! projection skip, followed by 2x2 max-pooling. A global average pool and
//! a linear head produce logits; the pooled features are the embeddings
//! handed to the episode base learner.

use std::path::Path;

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::activation::leaky_relu;

const LEAKY_SLOPE: f64 = 0.1;

/// Configuration for the ResNet-12 backbone.
///
/// Stage widths default to the standard 64/160/320/640; tests shrink them.
/// Input height and width must each survive four 2x2 max-pools (>= 16 px).
#[derive(Config, Debug)]
pub struct ResNet12Config {
    /// Number of classes for the linear head (base-training classes).
    pub num_classes: usize,
    /// Stage 1 width.
    #[config(default = 64)]
    pub c1: usize,
    /// Stage 2 width.
    #[config(default = 160)]
    pub c2: usize,
    /// Stage 3 width.
    #[config(default = 320)]
    pub c3: usize,
    /// Stage 4 width (embedding dimension).
    #[config(default = 640)]
    pub c4: usize,
    /// Dropout probability before the linear head. Inactive at inference.
    #[config(default = 0.1)]
    pub drop_rate: f64,
    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,
}

/// One residual stage: three conv-bn layers, a projection skip, max-pool.
#[derive(Module, Debug)]
struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    conv_skip: Conv2d<B>,
    bn_skip: BatchNorm<B, 2>,
    pool: MaxPool2d,
}

#[derive(Config, Debug)]
struct BasicBlockConfig {
    in_channels: usize,
    out_channels: usize,
}

impl BasicBlockConfig {
    fn init<B: Backend>(&self, device: &B::Device) -> BasicBlock<B> {
        let conv3x3 = |cin: usize, cout: usize| {
            Conv2dConfig::new([cin, cout], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device)
        };

        BasicBlock {
            conv1: conv3x3(self.in_channels, self.out_channels),
            bn1: BatchNormConfig::new(self.out_channels).init(device),
            conv2: conv3x3(self.out_channels, self.out_channels),
            bn2: BatchNormConfig::new(self.out_channels).init(device),
            conv3: conv3x3(self.out_channels, self.out_channels),
            bn3: BatchNormConfig::new(self.out_channels).init(device),
            conv_skip: Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            bn_skip: BatchNormConfig::new(self.out_channels).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

impl<B: Backend> BasicBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = self.bn_skip.forward(self.conv_skip.forward(x.clone()));

        let out = leaky_relu(self.bn1.forward(self.conv1.forward(x)), LEAKY_SLOPE);
        let out = leaky_relu(self.bn2.forward(self.conv2.forward(out)), LEAKY_SLOPE);
        let out = self.bn3.forward(self.conv3.forward(out));

        let out = leaky_relu(out + residual, LEAKY_SLOPE);
        self.pool.forward(out)
    }
}

/// ResNet-12 backbone with a linear classification head.
#[derive(Module, Debug)]
pub struct ResNet12<B: Backend> {
    block1: BasicBlock<B>,
    block2: BasicBlock<B>,
    block3: BasicBlock<B>,
    block4: BasicBlock<B>,
    avg_pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    classifier: Linear<B>,
}

impl ResNet12Config {
    /// Initialize a ResNet-12 with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet12<B> {
        ResNet12 {
            block1: BasicBlockConfig::new(self.in_channels, self.c1).init(device),
            block2: BasicBlockConfig::new(self.c1, self.c2).init(device),
            block3: BasicBlockConfig::new(self.c2, self.c3).init(device),
            block4: BasicBlockConfig::new(self.c3, self.c4).init(device),
            avg_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.drop_rate).init(),
            classifier: LinearConfig::new(self.c4, self.num_classes).init(device),
        }
    }

    /// Embedding dimension produced by [`ResNet12::embed`].
    pub fn embed_dim(&self) -> usize {
        self.c4
    }

    /// Load a ResNet-12 from a checkpoint file.
    ///
    /// Creates a fresh model from this config, then loads saved weights on
    /// top. A missing or malformed checkpoint is a fatal error.
    pub fn load<B: Backend>(&self, path: &Path, device: &B::Device) -> anyhow::Result<ResNet12<B>> {
        let model = self
            .init::<B>(device)
            .load_file(
                path,
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
                device,
            )
            .map_err(|e| {
                anyhow::anyhow!("Failed to load checkpoint from {}: {e}", path.display())
            })?;
        tracing::info!(path = %path.display(), "Loaded backbone checkpoint");
        Ok(model)
    }
}

impl<B: Backend> ResNet12<B> {
    /// Pooled penultimate features, shape `(batch, c4)`.
    pub fn embed(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(images);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);
        let x = self.block4.forward(x);
        let x = self.avg_pool.forward(x);
        x.flatten::<2>(1, 3)
    }

    /// Classifier logits, shape `(batch, num_classes)`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.embed(images);
        self.classifier.forward(self.dropout.forward(features))
    }

    /// Embeddings and logits from a single backbone pass.
    pub fn forward_both(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let features = self.embed(images);
        let logits = self.classifier.forward(self.dropout.forward(features.clone()));
        (features, logits)
    }

    /// Save the model weights to a checkpoint file.
    pub fn save(self, path: &Path) -> anyhow::Result<()> {
        self.save_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
            .map_err(|e| {
                anyhow::anyhow!("Failed to save checkpoint to {}: {e}", path.display())
            })?;
        Ok(())
    }
}
