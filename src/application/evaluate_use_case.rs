// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a stored checkpoint on the test split without training:
//
//   1. Read the level's saved TrainConfig (architecture, dataset)
//   2. Rebuild PyNet on the inference backend, load (level, epoch)
//   3. One held-out pass → EvalReport
//
// No gradients are tracked, so the plain (non-autodiff) backend
// is enough.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::*,
};

use crate::application::evaluation::evaluate;
use crate::application::train_use_case::{perceptual_net, DeviceChoice, TrainConfig};
use crate::data::{
    dataset::PairedImageDataset,
    loader::{DatasetLayout, Split},
    source::held_out_source,
};
use crate::domain::level::Level;
use crate::domain::metrics::EvalReport;
use crate::infra::checkpoint::{CheckpointKey, CheckpointStore};
use crate::ml::{algebra::BurnAlgebra, inferencer::BurnInference, model::PyNet, params};

#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub level:       u8,
    pub epoch:       usize,
    pub models_dir:  PathBuf,
    /// Overrides the dataset directory stored with the run.
    pub dataset_dir: Option<PathBuf>,
    /// Overrides the test size stored with the run.
    pub test_size:   Option<usize>,
    pub device:      DeviceChoice,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        let cfg   = &self.config;
        let level = Level::new(cfg.level)?;
        let store = CheckpointStore::new(&cfg.models_dir)?;

        let mut run: TrainConfig = store
            .load_config(level)
            .with_context(|| format!("No saved training config for level {level}"))?;
        if let Some(dir) = &cfg.dataset_dir {
            run.dataset_dir = dir.clone();
        }
        if let Some(n) = cfg.test_size {
            run.test_size = n;
        }

        let key = CheckpointKey::new(level, cfg.epoch);
        tracing::info!("Evaluating '{}'", store.path_for(key).display());

        let report = match cfg.device.resolve() {
            DeviceChoice::Cpu => score::<NdArray>(&run, level, &store, key, NdArrayDevice::Cpu)?,
            _ => score::<Wgpu>(&run, level, &store, key, WgpuDevice::default())?,
        };
        tracing::info!("Epoch {}, {report}", cfg.epoch);
        Ok(report)
    }
}

fn score<B: Backend>(
    run:    &TrainConfig,
    level:  Level,
    store:  &CheckpointStore,
    key:    CheckpointKey,
    device: B::Device,
) -> Result<EvalReport> {
    let state = store.load(key)?;
    let model: PyNet<B> = run.model_config(level).init(&device);
    let (model, report) = params::restore(model, &state)?;
    if !report.is_exact() {
        report.log();
        tracing::warn!("Checkpoint does not match the configured architecture exactly");
    }

    let engine = BurnInference::new(model, BurnAlgebra::new(perceptual_net::<B>(run, &device)?));

    let layout = DatasetLayout::open(&run.dataset_dir)?;
    let ds     = PairedImageDataset::new(layout, Split::Test, run.test_size, level.target_scale());
    let source = held_out_source::<B>(ds, device)?;

    Ok(evaluate(&engine, &source, level, run.test_size)?)
}
