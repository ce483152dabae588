// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their flags.
//
// Level-dependent defaults (batch size, epochs, restore epoch) are
// left as `Option` here and filled in from the recommended schedule
// when the args become a TrainConfig.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::application::evaluate_use_case::EvaluateConfig;
use crate::application::train_use_case::{
    DeviceChoice, TrainConfig, LEARNING_RATE, TEST_SIZE, TRAIN_SIZE, VISUAL_COUNT,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train one level of the network
    Train(TrainArgs),

    /// Score a saved checkpoint on the test split
    Evaluate(EvaluateArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceArg {
    /// GPU if one is detected, otherwise CPU
    Auto,
    /// WGPU backend
    Gpu,
    /// NdArray backend
    Cpu,
}

impl From<DeviceArg> for DeviceChoice {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Auto => DeviceChoice::Auto,
            DeviceArg::Gpu  => DeviceChoice::Gpu,
            DeviceArg::Cpu  => DeviceChoice::Cpu,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Curriculum level, 5 (coarsest) down to 0 (finest)
    #[arg(long)]
    pub level: u8,

    /// Samples per optimiser step [default: depends on level]
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long, default_value_t = LEARNING_RATE)]
    pub learning_rate: f64,

    /// Epoch of the level + 1 checkpoint to start from
    /// [default: last epoch of level + 1's schedule]
    #[arg(long)]
    pub restore_epoch: Option<usize>,

    /// Number of epochs [default: depends on level]
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Root of the dataset (train/, test/ subdirectories)
    #[arg(long, default_value = "raw_images")]
    pub dataset_dir: PathBuf,

    #[arg(long, default_value_t = TRAIN_SIZE)]
    pub train_size: usize,

    #[arg(long, default_value_t = TEST_SIZE)]
    pub test_size: usize,

    /// Full-resolution images rendered after every epoch's first step
    #[arg(long, default_value_t = VISUAL_COUNT)]
    pub visual_count: usize,

    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = DeviceArg::Auto)]
    pub device: DeviceArg,

    /// Seed for the backend RNG and the training shuffle
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Disable instance normalisation in the encoder and decoder blocks
    #[arg(long)]
    pub no_instance_norm: bool,

    /// Disable instance normalisation in the level-1 decoder block
    #[arg(long)]
    pub no_instance_norm_level_1: bool,

    /// Width of the first encoder block; each deeper block doubles it
    #[arg(long, default_value_t = 16)]
    pub base_channels: usize,

    /// Pretrained perceptual-network weights
    #[arg(long)]
    pub vgg_weights: Option<PathBuf>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let defaults = TrainConfig::for_level(a.level);
        TrainConfig {
            level:                 a.level,
            batch_size:            a.batch_size.unwrap_or(defaults.batch_size),
            learning_rate:         a.learning_rate,
            restore_epoch:         a.restore_epoch.or(defaults.restore_epoch),
            epochs:                a.epochs.unwrap_or(defaults.epochs),
            dataset_dir:           a.dataset_dir,
            train_size:            a.train_size,
            test_size:             a.test_size,
            visual_count:          a.visual_count,
            models_dir:            a.models_dir,
            results_dir:           a.results_dir,
            device:                a.device.into(),
            seed:                  a.seed,
            instance_norm:         !a.no_instance_norm,
            instance_norm_level_1: !a.no_instance_norm_level_1,
            base_channels:         a.base_channels,
            vgg_weights:           a.vgg_weights,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub level: u8,

    /// Checkpoint epoch to score
    #[arg(long)]
    pub epoch: usize,

    /// Directory holding checkpoints and the saved training config
    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    /// Use a different dataset root than the one the run was trained on
    #[arg(long)]
    pub dataset_dir: Option<PathBuf>,

    #[arg(long)]
    pub test_size: Option<usize>,

    #[arg(long, value_enum, default_value_t = DeviceArg::Auto)]
    pub device: DeviceArg,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            level:       a.level,
            epoch:       a.epoch,
            models_dir:  a.models_dir,
            dataset_dir: a.dataset_dir,
            test_size:   a.test_size,
            device:      a.device.into(),
        }
    }
}
