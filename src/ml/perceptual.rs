// ============================================================
// Layer 5 — Perceptual Feature Extractor
// ============================================================
// A frozen VGG-style conv stack: pairs of 3×3 conv + relu separated
// by 2×2 max-pools. Inputs are RGB in [0, 1]; they are normalised
// with the ImageNet statistics before the first conv.
//
// The stack is built with random weights and frozen. Pretrained
// weights can be supplied as a TrainableState file whose entries
// are named "features.<i>.weight" / "features.<i>.bias".

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::error::TrainResult;
use crate::domain::state::{LoadReport, Restorer, TrainableState};
use crate::ml::params::{join, restore, NamedParams};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Config, Debug)]
pub struct PerceptualConfig {
    #[config(default = 16)]
    pub base_channels: usize,
    /// Number of conv pairs; a pool sits between consecutive pairs.
    #[config(default = 3)]
    pub blocks: usize,
}

impl PerceptualConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PerceptualNet<B> {
        let mut features = Vec::with_capacity(self.blocks * 2);
        let mut in_channels = 3;
        for block in 0..self.blocks {
            let width = self.base_channels << block;
            for _ in 0..2 {
                features.push(
                    Conv2dConfig::new([in_channels, width], [3, 3])
                        .with_padding(PaddingConfig2d::Same)
                        .init(device),
                );
                in_channels = width;
            }
        }

        PerceptualNet {
            features,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
        .no_grad()
    }
}

#[derive(Module, Debug)]
pub struct PerceptualNet<B: Backend> {
    pub features: Vec<Conv2d<B>>,
    pub pool:     MaxPool2d,
}

impl<B: Backend> PerceptualNet<B> {
    /// [N, 3, H, W] → [N, C, H / 2^(blocks-1), W / 2^(blocks-1)]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = normalize_batch(images);
        for (i, conv) in self.features.iter().enumerate() {
            if i > 0 && i % 2 == 0 {
                x = self.pool.forward(x);
            }
            x = relu(conv.forward(x));
        }
        x
    }

    /// Swap in pretrained weights. Unknown or missing entries are
    /// reported, never fatal.
    pub fn load_weights(self, state: &TrainableState) -> TrainResult<(Self, LoadReport)> {
        let (net, report) = restore(self, state)?;
        Ok((net.no_grad(), report))
    }
}

impl<B: Backend> NamedParams for PerceptualNet<B> {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()> {
        self.features.export(&join(prefix, "features"), state)
    }

    fn import(self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self> {
        Ok(Self {
            features: self.features.import(&join(prefix, "features"), restorer)?,
            pool:     self.pool,
        })
    }
}

/// (x - mean) / std per channel, ImageNet statistics.
pub fn normalize_batch<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = images.device();
    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);
    (images - mean) / std
}
