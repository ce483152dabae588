// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Runs one level of the curriculum end to end:
//
//   Step 1: Validate config, log every parameter
//   Step 2: Save config next to the checkpoints     (Layer 6 - infra)
//   Step 3: Pick the backend (wgpu or ndarray)
//   Step 4: Build train / held-out / visual sources (Layer 4 - data)
//   Step 5: Build PyNet, perceptual net, Adam       (Layer 5 - ml)
//   Step 6: Warm-start from level + 1 (level < 5)   (Layer 2)
//   Step 7: Run the epoch loop                      (Layer 2)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    optim::AdamConfig,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::orchestrator::{Orchestrator, RunSummary};
use crate::data::{
    dataset::{PairedImageDataset, VisualDataset},
    loader::{DatasetLayout, Split},
    source::{held_out_source, training_source, visual_source},
};
use crate::domain::error::{TrainError, TrainResult};
use crate::domain::level::{default_restore_epoch, defaults_for, Level};
use crate::domain::traits::{EpochSource, ResourceMonitor};
use crate::infra::{
    checkpoint::{read_state, CheckpointStore},
    gpu::NvidiaSmiMonitor,
    metrics::MetricsLogger,
    visuals::VisualExporter,
};
use crate::ml::{
    algebra::BurnAlgebra,
    model::{PyNet, PyNetConfig},
    perceptual::{PerceptualConfig, PerceptualNet},
    trainer::BurnTrainer,
};

pub const TRAIN_SIZE: usize = 46839;
pub const TEST_SIZE: usize = 1204;
pub const VISUAL_COUNT: usize = 10;
pub const LEARNING_RATE: f64 = 5e-5;

/// Compute backend for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceChoice {
    /// GPU when an NVIDIA device answers, CPU otherwise.
    Auto,
    Gpu,
    Cpu,
}

impl DeviceChoice {
    /// Collapse `Auto` into a concrete backend.
    pub fn resolve(self) -> DeviceChoice {
        match self {
            DeviceChoice::Auto if NvidiaSmiMonitor::new(0).used_memory_mib().is_some() => DeviceChoice::Gpu,
            DeviceChoice::Auto => {
                tracing::warn!("No GPU detected, falling back to CPU");
                DeviceChoice::Cpu
            }
            other => other,
        }
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All parameters of one level's run. Saved as JSON next to the
// checkpoints so a later `evaluate` can rebuild the same model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub level:                 u8,
    pub batch_size:            usize,
    pub learning_rate:         f64,
    pub restore_epoch:         Option<usize>,
    pub epochs:                usize,
    pub dataset_dir:           PathBuf,
    pub train_size:            usize,
    pub test_size:             usize,
    pub visual_count:          usize,
    pub models_dir:            PathBuf,
    pub results_dir:           PathBuf,
    pub device:                DeviceChoice,
    pub seed:                  u64,
    pub instance_norm:         bool,
    pub instance_norm_level_1: bool,
    pub base_channels:         usize,
    /// Pretrained perceptual weights (bincode + gzip TrainableState).
    pub vgg_weights:           Option<PathBuf>,
}

impl TrainConfig {
    /// Recommended schedule for `level`.
    pub fn for_level(level: u8) -> Self {
        let defaults = defaults_for(level);
        Self {
            level,
            batch_size:            defaults.batch_size,
            learning_rate:         LEARNING_RATE,
            restore_epoch:         default_restore_epoch(level),
            epochs:                defaults.epochs,
            dataset_dir:           PathBuf::from("raw_images"),
            train_size:            TRAIN_SIZE,
            test_size:             TEST_SIZE,
            visual_count:          VISUAL_COUNT,
            models_dir:            PathBuf::from("models"),
            results_dir:           PathBuf::from("results"),
            device:                DeviceChoice::Auto,
            seed:                  0,
            instance_norm:         true,
            instance_norm_level_1: true,
            base_channels:         16,
            vgg_weights:           None,
        }
    }

    /// Reject parameters that cannot start a run.
    pub fn validate(&self) -> TrainResult<Level> {
        let level = Level::new(self.level)?;
        if self.batch_size == 0 {
            return Err(TrainError::config("batch size must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::config(format!(
                "learning rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.test_size == 0 {
            return Err(TrainError::config("test size must be positive"));
        }
        if self.base_channels == 0 {
            return Err(TrainError::config("base channel count must be positive"));
        }
        if !level.is_coarsest() && self.restore_epoch.is_none() {
            return Err(TrainError::config(format!(
                "level {level} warm-starts from level {} and needs a restore epoch",
                level.get() + 1
            )));
        }
        Ok(level)
    }

    pub fn model_config(&self, level: Level) -> PyNetConfig {
        PyNetConfig::for_level(level)
            .with_instance_norm(self.instance_norm)
            .with_instance_norm_level_1(self.instance_norm_level_1)
            .with_base_channels(self.base_channels)
    }

    fn log(&self) {
        tracing::info!("The following parameters will be applied for training:");
        tracing::info!("Training level: {}", self.level);
        tracing::info!("Batch size: {}", self.batch_size);
        tracing::info!("Learning rate: {}", self.learning_rate);
        tracing::info!("Epochs: {}", self.epochs);
        match self.restore_epoch {
            Some(e) => tracing::info!("Restore epoch: {e}"),
            None => tracing::info!("Restore epoch: none"),
        }
        tracing::info!("Path to the dataset: {}", self.dataset_dir.display());
        tracing::info!("Train / test size: {} / {}", self.train_size, self.test_size);
        tracing::info!("Device: {:?}", self.device);
        tracing::debug!("Full config: {self:?}");
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<RunSummary> {
        let cfg = &self.config;

        // ── Step 1: Validate + log ────────────────────────────────────────────
        let level = cfg.validate()?;
        cfg.log();

        // ── Step 2: Save config for evaluation ────────────────────────────────
        let checkpoints = CheckpointStore::new(&cfg.models_dir)?;
        checkpoints.save_config(level, cfg)?;

        // ── Step 3: Backend dispatch ──────────────────────────────────────────
        match cfg.device.resolve() {
            DeviceChoice::Cpu => {
                tracing::info!("Using NdArray (CPU) backend");
                run::<Autodiff<NdArray>>(cfg, level, &checkpoints, NdArrayDevice::Cpu, None)
            }
            _ => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                let monitor: Box<dyn ResourceMonitor> = Box::new(NvidiaSmiMonitor::new(0));
                run::<Autodiff<Wgpu>>(cfg, level, &checkpoints, device, Some(monitor))
            }
        }
    }
}

fn run<B: AutodiffBackend>(
    cfg:         &TrainConfig,
    level:       Level,
    checkpoints: &CheckpointStore,
    device:      B::Device,
    monitor:     Option<Box<dyn ResourceMonitor>>,
) -> Result<RunSummary> {
    B::seed(cfg.seed);

    // ── Step 4: Data sources ──────────────────────────────────────────────────
    let layout = DatasetLayout::open(&cfg.dataset_dir)?;
    let scale  = level.target_scale();

    tracing::info!("Loading training data...");
    let train_ds = PairedImageDataset::new(layout.clone(), Split::Train, cfg.train_size, scale);
    let train    = training_source::<B>(train_ds, cfg.batch_size, cfg.seed, device.clone())?;

    tracing::info!("Loading test data...");
    let test_ds  = PairedImageDataset::new(layout.clone(), Split::Test, cfg.test_size, scale);
    let held_out = held_out_source::<B::InnerBackend>(test_ds, device.clone())?;

    let visual_ds = VisualDataset::new(layout.visual_paths(cfg.visual_count)?);
    let visuals   = visual_source::<B::InnerBackend>(visual_ds, device.clone());
    tracing::info!(
        "{} training batches, {} held-out samples, {} visual inputs",
        train.num_batches(),
        cfg.test_size,
        visuals.num_batches()
    );

    // ── Step 5: Model, perceptual net, optimiser ──────────────────────────────
    let model: PyNet<B> = cfg.model_config(level).init(&device);
    let perceptual = perceptual_net::<B>(cfg, &device)?;
    let optim = AdamConfig::new().init::<B, PyNet<B>>();
    let engine = BurnTrainer::new(model, optim, cfg.learning_rate, BurnAlgebra::new(perceptual));

    let exporter   = VisualExporter::new(&cfg.results_dir)?;
    let metrics_db = MetricsLogger::new(&cfg.results_dir, level)?;

    let mut orchestrator = Orchestrator::new(engine, level, cfg.epochs, cfg.test_size, checkpoints, &exporter)
        .with_metrics_log(&metrics_db);
    if let Some(monitor) = monitor {
        orchestrator = orchestrator.with_monitor(monitor);
    }

    // ── Step 6: Warm start ────────────────────────────────────────────────────
    orchestrator
        .warm_start(cfg.restore_epoch)
        .context("Cannot warm-start from the coarser level")?;

    // ── Step 7: Train ─────────────────────────────────────────────────────────
    tracing::info!("Training network");
    let summary = orchestrator.run(&train, &held_out, &visuals)?;
    Ok(summary)
}

/// Perceptual feature extractor, with pretrained weights when configured.
pub fn perceptual_net<B: Backend>(cfg: &TrainConfig, device: &B::Device) -> Result<PerceptualNet<B>> {
    let net = PerceptualConfig::new().init::<B>(device);
    let Some(path) = cfg.vgg_weights.as_ref() else {
        tracing::warn!("No perceptual weights given; content loss uses a randomly initialised extractor");
        return Ok(net);
    };

    let state = read_state(path)
        .with_context(|| format!("Cannot read perceptual weights '{}'", path.display()))?;
    let (net, report) = net.load_weights(&state)?;
    report.log();
    Ok(net)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::tests::write_dataset;
    use crate::infra::checkpoint::CheckpointKey;
    use tempfile::TempDir;

    fn tiny_config(data: &TempDir, out: &TempDir, level: u8) -> TrainConfig {
        TrainConfig {
            batch_size:    2,
            epochs:        1,
            dataset_dir:   data.path().to_path_buf(),
            train_size:    4,
            test_size:     2,
            visual_count:  1,
            models_dir:    out.path().join("models"),
            results_dir:   out.path().join("results"),
            device:        DeviceChoice::Cpu,
            base_channels: 2,
            ..TrainConfig::for_level(level)
        }
    }

    #[test]
    fn test_level_defaults() {
        let cfg = TrainConfig::for_level(5);
        assert_eq!((cfg.batch_size, cfg.epochs, cfg.restore_epoch), (50, 17, None));
        let cfg = TrainConfig::for_level(0);
        assert_eq!((cfg.batch_size, cfg.epochs, cfg.restore_epoch), (10, 10, Some(11)));
        assert_eq!(cfg.learning_rate, LEARNING_RATE);
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let mut cfg = TrainConfig::for_level(5);
        cfg.level = 6;
        assert!(matches!(cfg.validate(), Err(TrainError::Configuration(_))));

        let mut cfg = TrainConfig::for_level(5);
        cfg.batch_size = 0;
        assert!(matches!(cfg.validate(), Err(TrainError::Configuration(_))));

        let mut cfg = TrainConfig::for_level(3);
        cfg.restore_epoch = None;
        assert!(matches!(cfg.validate(), Err(TrainError::Configuration(_))));

        let mut cfg = TrainConfig::for_level(2);
        cfg.learning_rate = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg = TrainConfig::for_level(1);
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"device\":\"auto\""));
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.restore_epoch, cfg.restore_epoch);
        assert_eq!(back.device, DeviceChoice::Auto);
    }

    #[test]
    fn test_coarsest_level_runs_on_cpu() {
        // 64x64 mosaics pack to 32x32 inputs; level 5 outputs 2x2
        let data = write_dataset(4, 2, 64, 1);
        let out  = TempDir::new().unwrap();
        let cfg  = tiny_config(&data, &out, 5);

        let summary = TrainUseCase::new(cfg.clone()).execute().unwrap();

        assert_eq!(summary.optimizer_steps, 2);
        assert_eq!(summary.checkpoints_saved, 1);
        assert_eq!(summary.visuals_written, 1);
        assert_eq!(summary.reports.len(), 1);
        assert!(summary.reports[0].mse > 0.0);
        assert_eq!(summary.reports[0].vgg, None);

        let store = CheckpointStore::new(&cfg.models_dir).unwrap();
        let level = Level::new(5).unwrap();
        assert!(store.path_for(CheckpointKey::new(level, 0)).exists());
        let saved: TrainConfig = store.load_config(level).unwrap();
        assert_eq!(saved.batch_size, 2);
        assert!(cfg.results_dir.join("pynet_img_0_level_5_epoch_0.jpg").exists());
        assert!(cfg.results_dir.join("metrics_level_5.csv").exists());
    }

    #[test]
    fn test_finer_level_needs_coarser_checkpoint() {
        let data = write_dataset(4, 2, 64, 1);
        let out  = TempDir::new().unwrap();
        let mut cfg = tiny_config(&data, &out, 4);
        cfg.restore_epoch = Some(0);

        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::ResourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_level_4_warm_starts_from_level_5() {
        let data = write_dataset(4, 2, 64, 1);
        let out  = TempDir::new().unwrap();

        TrainUseCase::new(tiny_config(&data, &out, 5)).execute().unwrap();

        let mut cfg = tiny_config(&data, &out, 4);
        cfg.restore_epoch = Some(0);
        let summary = TrainUseCase::new(cfg).execute().unwrap();
        assert_eq!(summary.optimizer_steps, 2);
        assert!(summary.reports[0].vgg.is_some());
    }
}
