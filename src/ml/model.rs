// ============================================================
// Layer 5 — PyNET-style Pyramid Network
// ============================================================
// A level-conditioned encoder/decoder over packed Bayer input.
//
//   input [N, 4, H, W]
//     │
//     ├─ encoder.0 ──────────────────────────────┐ H
//     │   pool                                    │
//     ├─ encoder.1 ───────────────────────┐ H/2   │
//     │   ...                              │       │
//     └─ encoder.4 ─► decoder stage 5 ─► up ─► stage 4 ─► ... ─► stage L
//                        (H/16)                                    │
//                                                            head + sigmoid
//
// Decoder stage s works at H / 2^(s-1), so stage 0 upsamples past
// the input resolution and the level-L output is packed·2^(1-L).
// Stages 1..=4 concatenate the encoder features of the same size;
// stage 0 has no skip. Every stage keeps its own head so weights
// line up by name when a coarser model seeds a finer one.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    module::Param,
    prelude::*,
    tensor::activation::{leaky_relu, sigmoid},
};

use crate::domain::error::TrainResult;
use crate::domain::level::{Level, MAX_LEVEL, PACKED_MULTIPLE};
use crate::domain::state::{Restorer, TrainableState};
use crate::ml::params::{export_param, import_param, join, NamedParams};

const LEAKY_SLOPE: f64 = 0.2;
const NORM_EPSILON: f64 = 1e-5;
const ENCODER_DEPTH: usize = 5;

const _: () = assert!(1 << (ENCODER_DEPTH - 1) == PACKED_MULTIPLE);

#[derive(Config, Debug)]
pub struct PyNetConfig {
    pub level: usize,
    #[config(default = true)]
    pub instance_norm: bool,
    #[config(default = true)]
    pub instance_norm_level_1: bool,
    #[config(default = 16)]
    pub base_channels: usize,
}

impl PyNetConfig {
    pub fn for_level(level: Level) -> Self {
        Self::new(level.index())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PyNet<B> {
        let enc_width = |k: usize| self.base_channels << k;

        let mut encoders = Vec::with_capacity(ENCODER_DEPTH);
        let mut in_channels = 4;
        for k in 0..ENCODER_DEPTH {
            let norm = self.instance_norm && k > 0;
            encoders.push(ConvBlock::new(in_channels, enc_width(k), norm, device));
            in_channels = enc_width(k);
        }

        let mut decoders = Vec::new();
        let mut prev_width = 0;
        for scale in (self.level..=MAX_LEVEL as usize).rev() {
            let width = self.stage_width(scale);
            let up = (scale < MAX_LEVEL as usize).then(|| {
                ConvTranspose2dConfig::new([prev_width, width], [2, 2])
                    .with_stride([2, 2])
                    .init(device)
            });
            let block_in = match scale {
                5 => enc_width(ENCODER_DEPTH - 1),
                0 => width,
                s => width + enc_width(s - 1),
            };
            let block = ConvBlock::new(block_in, width, self.stage_norm(scale), device);
            let head = Conv2dConfig::new([width, 3], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device);
            decoders.push(DecoderStage { up, block, head, scale });
            prev_width = width;
        }

        PyNet {
            encoders,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            decoders,
            level: self.level,
        }
    }

    fn stage_width(&self, scale: usize) -> usize {
        self.base_channels << scale.saturating_sub(1)
    }

    fn stage_norm(&self, scale: usize) -> bool {
        match scale {
            0 => false,
            1 => self.instance_norm_level_1,
            _ => self.instance_norm,
        }
    }
}

// ─── Instance normalisation ───────────────────────────────────────────────────
/// Per-sample, per-channel normalisation with a learned affine.
#[derive(Module, Debug)]
pub struct InstanceNorm2d<B: Backend> {
    pub gamma: Param<Tensor<B, 1>>,
    pub beta:  Param<Tensor<B, 1>>,
}

impl<B: Backend> InstanceNorm2d<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            gamma: Param::from_tensor(Tensor::ones([channels], device)),
            beta:  Param::from_tensor(Tensor::zeros([channels], device)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, channels, _, _] = x.dims();
        let mean     = x.clone().mean_dim(3).mean_dim(2);
        let centered = x - mean;
        let var      = centered.clone().powf_scalar(2.0).mean_dim(3).mean_dim(2);
        let normed   = centered / var.add_scalar(NORM_EPSILON).sqrt();

        let gamma = self.gamma.val().reshape([1, channels, 1, 1]);
        let beta  = self.beta.val().reshape([1, channels, 1, 1]);
        normed * gamma + beta
    }
}

impl<B: Backend> NamedParams for InstanceNorm2d<B> {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()> {
        export_param(join(prefix, "gamma"), &self.gamma, state)?;
        export_param(join(prefix, "beta"), &self.beta, state)
    }

    fn import(mut self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self> {
        self.gamma = import_param(&join(prefix, "gamma"), self.gamma, restorer);
        self.beta = import_param(&join(prefix, "beta"), self.beta, restorer);
        Ok(self)
    }
}

// ─── ConvBlock ────────────────────────────────────────────────────────────────
/// conv 3×3 → [norm] → leaky relu, twice.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv_a: Conv2d<B>,
    pub norm_a: Option<InstanceNorm2d<B>>,
    pub conv_b: Conv2d<B>,
    pub norm_b: Option<InstanceNorm2d<B>>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, norm: bool, device: &B::Device) -> Self {
        let conv = |i, o| {
            Conv2dConfig::new([i, o], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };
        Self {
            conv_a: conv(in_channels, out_channels),
            norm_a: norm.then(|| InstanceNorm2d::new(out_channels, device)),
            conv_b: conv(out_channels, out_channels),
            norm_b: norm.then(|| InstanceNorm2d::new(out_channels, device)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv_a.forward(x);
        let x = match &self.norm_a {
            Some(norm) => norm.forward(x),
            None => x,
        };
        let x = leaky_relu(x, LEAKY_SLOPE);
        let x = self.conv_b.forward(x);
        let x = match &self.norm_b {
            Some(norm) => norm.forward(x),
            None => x,
        };
        leaky_relu(x, LEAKY_SLOPE)
    }
}

impl<B: Backend> NamedParams for ConvBlock<B> {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()> {
        self.conv_a.export(&join(prefix, "conv_a"), state)?;
        self.norm_a.export(&join(prefix, "norm_a"), state)?;
        self.conv_b.export(&join(prefix, "conv_b"), state)?;
        self.norm_b.export(&join(prefix, "norm_b"), state)
    }

    fn import(self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self> {
        Ok(Self {
            conv_a: self.conv_a.import(&join(prefix, "conv_a"), restorer)?,
            norm_a: self.norm_a.import(&join(prefix, "norm_a"), restorer)?,
            conv_b: self.conv_b.import(&join(prefix, "conv_b"), restorer)?,
            norm_b: self.norm_b.import(&join(prefix, "norm_b"), restorer)?,
        })
    }
}

// ─── DecoderStage ─────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    /// Absent on the coarsest stage.
    pub up:    Option<ConvTranspose2d<B>>,
    pub block: ConvBlock<B>,
    pub head:  Conv2d<B>,
    pub scale: usize,
}

impl<B: Backend> NamedParams for DecoderStage<B> {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()> {
        self.up.export(&join(prefix, "up"), state)?;
        self.block.export(&join(prefix, "block"), state)?;
        self.head.export(&join(prefix, "head"), state)
    }

    fn import(self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self> {
        Ok(Self {
            up:    self.up.import(&join(prefix, "up"), restorer)?,
            block: self.block.import(&join(prefix, "block"), restorer)?,
            head:  self.head.import(&join(prefix, "head"), restorer)?,
            scale: self.scale,
        })
    }
}

// ─── PyNet ────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct PyNet<B: Backend> {
    pub encoders: Vec<ConvBlock<B>>,
    pub pool:     MaxPool2d,
    /// Ordered coarse → fine, scale 5 first.
    pub decoders: Vec<DecoderStage<B>>,
    pub level:    usize,
}

impl<B: Backend> PyNet<B> {
    /// input: [N, 4, H, W] with H, W divisible by `PACKED_MULTIPLE`
    /// → [N, 3, H·2^(1-L), W·2^(1-L)]
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(ENCODER_DEPTH);
        let mut x = input;
        for (k, encoder) in self.encoders.iter().enumerate() {
            if k > 0 {
                x = self.pool.forward(x);
            }
            x = encoder.forward(x);
            skips.push(x.clone());
        }

        let mut features = x;
        let mut last_head = None;
        for stage in &self.decoders {
            if let Some(up) = &stage.up {
                features = up.forward(features);
            }
            if (1..MAX_LEVEL as usize).contains(&stage.scale) {
                features = Tensor::cat(vec![features, skips[stage.scale - 1].clone()], 1);
            }
            features = stage.block.forward(features);
            last_head = Some(&stage.head);
        }

        match last_head {
            Some(head) => sigmoid(head.forward(features)),
            None => features,
        }
    }
}

impl<B: Backend> NamedParams for PyNet<B> {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()> {
        self.encoders.export(&join(prefix, "encoder"), state)?;
        for stage in &self.decoders {
            stage.export(&join(prefix, &format!("decoder.{}", stage.scale)), state)?;
        }
        Ok(())
    }

    fn import(self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self> {
        let encoders = self.encoders.import(&join(prefix, "encoder"), restorer)?;
        let decoders = self
            .decoders
            .into_iter()
            .map(|stage| {
                let name = join(prefix, &format!("decoder.{}", stage.scale));
                stage.import(&name, restorer)
            })
            .collect::<TrainResult<Vec<_>>>()?;
        Ok(Self { encoders, pool: self.pool, decoders, level: self.level })
    }
}
