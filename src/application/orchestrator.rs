// ============================================================
// Layer 2 — Training Orchestrator
// ============================================================
// Drives one level of the curriculum:
//
//   warm_start   load (level + 1, restore_epoch) non-strictly
//                (skipped at the coarsest level)
//
//   run          for epoch in 0..epochs:
//                  for step in 0..num_batches:
//                    step % 50 == 0 → log accelerator memory
//                    forward → compose loss → optimise
//                    step == 0      → checkpoint (level, epoch)
//                                     export visuals
//                                     evaluate + log report
//
// The side effects of step 0 run after that step's optimiser update
// and always go through the engine's inference view, so the trained
// model itself never changes mode.
//
// Reference: Burn Book §5 (Custom Training Loop)

use crate::application::evaluation::evaluate;
use crate::domain::error::{TrainError, TrainResult};
use crate::domain::level::Level;
use crate::domain::loss::LossComposer;
use crate::domain::metrics::EvalReport;
use crate::domain::state::LoadReport;
use crate::domain::traits::{EngineImage, EpochSource, InferenceEngine, ResourceMonitor, TrainPair, TrainingEngine};
use crate::infra::checkpoint::{CheckpointKey, CheckpointStore};
use crate::infra::metrics::MetricsLogger;
use crate::infra::visuals::VisualExporter;

/// Steps between two accelerator-memory samples.
pub const MEMORY_LOG_INTERVAL: usize = 50;

type SampleOf<E> = <<E as TrainingEngine>::Inference as InferenceEngine>::Sample;
type RawOf<E>    = <<E as TrainingEngine>::Inference as InferenceEngine>::Raw;

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub optimizer_steps:   usize,
    pub checkpoints_saved: usize,
    pub visuals_written:   usize,
    pub reports:           Vec<EvalReport>,
}

pub struct Orchestrator<'a, E: TrainingEngine> {
    level:         Level,
    epochs:        usize,
    held_out_size: usize,
    engine:        E,
    composer:      LossComposer,
    checkpoints:   &'a CheckpointStore,
    visuals:       &'a VisualExporter,
    metrics_log:   Option<&'a MetricsLogger>,
    monitor:       Option<Box<dyn ResourceMonitor>>,
}

impl<'a, E: TrainingEngine> Orchestrator<'a, E> {
    pub fn new(
        engine:        E,
        level:         Level,
        epochs:        usize,
        held_out_size: usize,
        checkpoints:   &'a CheckpointStore,
        visuals:       &'a VisualExporter,
    ) -> Self {
        Self {
            level,
            epochs,
            held_out_size,
            engine,
            composer: LossComposer::new(level),
            checkpoints,
            visuals,
            metrics_log: None,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Box<dyn ResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_metrics_log(mut self, log: &'a MetricsLogger) -> Self {
        self.metrics_log = Some(log);
        self
    }

    #[cfg(test)]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Seed the model from the coarser level's checkpoint.
    ///
    /// Returns `Ok(None)` at the coarsest level. Anywhere else a
    /// restore epoch is required and the checkpoint must exist.
    pub fn warm_start(&mut self, restore_epoch: Option<usize>) -> TrainResult<Option<LoadReport>> {
        if self.level.is_coarsest() {
            tracing::info!("Level {} trains from scratch", self.level);
            return Ok(None);
        }
        let epoch = restore_epoch.ok_or_else(|| {
            TrainError::config(format!("level {} needs a restore epoch to warm-start from", self.level))
        })?;
        let Some(key) = CheckpointKey::warm_start(self.level, epoch) else {
            return Ok(None);
        };

        tracing::info!(
            "Warm-starting level {} from '{}'",
            self.level,
            self.checkpoints.path_for(key).display()
        );
        let state  = self.checkpoints.load(key)?;
        let report = self.engine.restore(&state)?;
        report.log();
        Ok(Some(report))
    }

    pub fn run<T, H, V>(&mut self, train: &T, held_out: &H, visuals: &V) -> TrainResult<RunSummary>
    where
        T: EpochSource<Item = TrainResult<TrainPair<EngineImage<E>>>>,
        H: EpochSource<Item = TrainResult<SampleOf<E>>>,
        V: EpochSource<Item = TrainResult<RawOf<E>>>,
    {
        let mut summary = RunSummary::default();
        let num_batches = train.num_batches();
        tracing::info!(
            "Training level {} for {} epochs of {} batches",
            self.level,
            self.epochs,
            num_batches
        );

        for epoch in 0..self.epochs {
            let mut batches = train.epoch();

            for step in 0..num_batches {
                if step % MEMORY_LOG_INTERVAL == 0 {
                    self.log_memory(epoch, step);
                }

                let batch = batches.next().ok_or_else(|| {
                    TrainError::compute(format!(
                        "training source exhausted at step {step} of {num_batches} (epoch {epoch})"
                    ))
                })??;

                let output    = self.engine.forward(batch.input);
                let objective = self.composer.compose(self.engine.algebra(), &output, &batch.target)?;
                tracing::trace!("epoch {epoch} step {step}: {}", objective.terms);
                self.engine.optimize(objective.total)?;
                summary.optimizer_steps += 1;

                if step == 0 {
                    let report = self.end_of_epoch_pass(epoch, held_out, visuals, &mut summary)?;
                    summary.reports.push(report);
                }
            }
        }

        tracing::info!(
            "Level {} done: {} optimiser steps, {} checkpoints",
            self.level,
            summary.optimizer_steps,
            summary.checkpoints_saved
        );
        Ok(summary)
    }

    /// Checkpoint, visuals and evaluation, in that order.
    fn end_of_epoch_pass<H, V>(
        &self,
        epoch:    usize,
        held_out: &H,
        visuals:  &V,
        summary:  &mut RunSummary,
    ) -> TrainResult<EvalReport>
    where
        H: EpochSource<Item = TrainResult<SampleOf<E>>>,
        V: EpochSource<Item = TrainResult<RawOf<E>>>,
    {
        let key  = CheckpointKey::new(self.level, epoch);
        let path = self.checkpoints.save(key, &self.engine.snapshot()?)?;
        summary.checkpoints_saved += 1;
        tracing::debug!("Checkpoint saved: '{}'", path.display());

        let inference = self.engine.inference();
        summary.visuals_written += self.visuals.export(&inference, visuals, self.level, epoch)?;

        let report = evaluate(&inference, held_out, self.level, self.held_out_size)?;
        tracing::info!("Epoch {epoch}, {report}");

        if let Some(log) = self.metrics_log {
            log.log(epoch, &report)?;
        }
        Ok(report)
    }

    fn log_memory(&self, epoch: usize, step: usize) {
        let Some(monitor) = self.monitor.as_ref() else {
            return;
        };
        match monitor.used_memory_mib() {
            Some(mib) => tracing::info!("GPU memory used: {mib:.0} MiB (epoch {epoch}, step {step})"),
            None => tracing::debug!("GPU memory unavailable (epoch {epoch}, step {step})"),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;

    use crate::domain::loss::tests::VecAlgebra;
    use crate::domain::metrics::{MetricSet, SampleMetrics};
    use crate::domain::rendered::RenderedImage;
    use crate::domain::state::{ParamTensor, Restorer, TrainableState};

    // ── Test doubles ─────────────────────────────────────────────────────────

    /// Replays a fixed item list; `announcing` lets it over-promise.
    pub(crate) struct VecSource<T> {
        items:     Vec<T>,
        announced: usize,
    }

    impl<T: Clone> VecSource<T> {
        pub(crate) fn new(items: Vec<T>) -> Self {
            let announced = items.len();
            Self { items, announced }
        }

        pub(crate) fn announcing(mut self, announced: usize) -> Self {
            self.announced = announced;
            self
        }
    }

    impl<T: Clone> EpochSource for VecSource<T> {
        type Item = TrainResult<T>;

        fn num_batches(&self) -> usize {
            self.announced
        }

        fn epoch(&self) -> Box<dyn Iterator<Item = TrainResult<T>> + '_> {
            Box::new(self.items.iter().cloned().map(Ok))
        }
    }

    /// Held-out samples are their own mse; visuals render to one grey pixel.
    #[derive(Default)]
    pub(crate) struct MockInference;

    impl InferenceEngine for MockInference {
        type Sample = f64;
        type Raw = Vec<f64>;

        fn measure(&self, sample: f64, metrics: MetricSet) -> TrainResult<SampleMetrics> {
            Ok(SampleMetrics {
                mse:  sample,
                vgg:  metrics.vgg.then_some(0.2),
                ssim: metrics.ssim.then_some(0.9),
            })
        }

        fn render(&self, _raw: Vec<f64>) -> TrainResult<RenderedImage> {
            RenderedImage::from_planar(1, 1, &[0.5, 0.5, 0.5])
        }
    }

    /// One scalar weight; optimize() nudges it against the loss.
    struct MockEngine {
        algebra: VecAlgebra,
        weight:  f64,
        steps:   usize,
    }

    impl MockEngine {
        fn new() -> Self {
            Self { algebra: VecAlgebra::new(0.8), weight: 1.0, steps: 0 }
        }
    }

    impl TrainingEngine for MockEngine {
        type Algebra = VecAlgebra;
        type Inference = MockInference;

        fn algebra(&self) -> &VecAlgebra {
            &self.algebra
        }

        fn forward(&self, input: Vec<f64>) -> Vec<f64> {
            input.iter().map(|x| x * self.weight).collect()
        }

        fn optimize(&mut self, loss: f64) -> TrainResult<()> {
            self.weight -= 0.01 * loss;
            self.steps += 1;
            Ok(())
        }

        fn snapshot(&self) -> TrainResult<TrainableState> {
            let mut state = TrainableState::new();
            state.insert("w", ParamTensor::new(vec![1], vec![self.weight as f32])?);
            Ok(state)
        }

        fn restore(&mut self, state: &TrainableState) -> TrainResult<LoadReport> {
            let mut restorer = Restorer::new(state);
            if let Some(saved) = restorer.take("w", &[1]) {
                self.weight = saved.values[0] as f64;
            }
            Ok(restorer.finish())
        }

        fn inference(&self) -> MockInference {
            MockInference
        }
    }

    struct CountingMonitor {
        calls: Rc<Cell<usize>>,
    }

    impl ResourceMonitor for CountingMonitor {
        fn used_memory_mib(&self) -> Option<f64> {
            self.calls.set(self.calls.get() + 1);
            Some(1024.0)
        }
    }

    struct Workspace {
        _dir:        TempDir,
        checkpoints: CheckpointStore,
        visuals:     VisualExporter,
    }

    fn workspace() -> Workspace {
        let dir = TempDir::new().unwrap();
        let checkpoints = CheckpointStore::new(dir.path().join("models")).unwrap();
        let visuals = VisualExporter::new(dir.path().join("results")).unwrap();
        Workspace { _dir: dir, checkpoints, visuals }
    }

    fn level(l: u8) -> Level {
        Level::new(l).unwrap()
    }

    fn pairs(n: usize) -> VecSource<TrainPair<Vec<f64>>> {
        VecSource::new(vec![TrainPair { input: vec![0.5, 0.25], target: vec![0.4, 0.3] }; n])
    }

    fn raws(n: usize) -> VecSource<Vec<f64>> {
        VecSource::new(vec![vec![0.0]; n])
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[test]
    fn test_coarsest_level_single_epoch() {
        let ws = workspace();
        let held_out = VecSource::new(vec![0.01, 0.01]);
        let mut orch = Orchestrator::new(MockEngine::new(), level(5), 1, 2, &ws.checkpoints, &ws.visuals);

        let summary = orch.run(&pairs(4), &held_out, &raws(10)).unwrap();

        assert_eq!(summary.optimizer_steps, 4);
        assert_eq!(orch.engine().steps, 4);
        assert_eq!(summary.checkpoints_saved, 1);
        assert_eq!(summary.visuals_written, 10);
        assert_eq!(summary.reports.len(), 1);

        let report = summary.reports[0];
        assert!((report.mse - 0.01).abs() < 1e-12);
        assert!((report.psnr - 20.0).abs() < 1e-9);
        assert_eq!(report.vgg, None);
        assert_eq!(report.ssim, None);

        assert!(ws.checkpoints.path_for(CheckpointKey::new(level(5), 0)).exists());
        assert!(ws.visuals.path_for(9, level(5), 0).exists());
    }

    #[test]
    fn test_checkpoint_taken_after_first_step() {
        let ws = workspace();
        let mut orch = Orchestrator::new(MockEngine::new(), level(5), 1, 1, &ws.checkpoints, &ws.visuals);
        orch.run(&pairs(3), &VecSource::new(vec![0.01]), &raws(1)).unwrap();

        let saved = ws.checkpoints.load(CheckpointKey::new(level(5), 0)).unwrap();
        let weight = saved.get("w").unwrap().values[0];
        assert!(weight < 1.0, "checkpoint should hold the weight after one update");
        assert!((weight as f64) > orch.engine().weight);
    }

    #[test]
    fn test_one_checkpoint_per_epoch() {
        let ws = workspace();
        let mut orch = Orchestrator::new(MockEngine::new(), level(3), 3, 1, &ws.checkpoints, &ws.visuals);
        let summary = orch.run(&pairs(2), &VecSource::new(vec![0.02]), &raws(2)).unwrap();

        assert_eq!(summary.optimizer_steps, 6);
        assert_eq!(summary.checkpoints_saved, 3);
        assert_eq!(summary.visuals_written, 6);
        for epoch in 0..3 {
            assert!(ws.checkpoints.path_for(CheckpointKey::new(level(3), epoch)).exists());
        }
        assert!(summary.reports.iter().all(|r| r.vgg.is_some() && r.ssim.is_none()));
    }

    #[test]
    fn test_finest_level_report() {
        let ws = workspace();
        let held_out = VecSource::new(vec![0.01, 0.02, 0.015]);
        let mut orch = Orchestrator::new(MockEngine::new(), level(0), 1, 3, &ws.checkpoints, &ws.visuals);
        let summary = orch.run(&pairs(1), &held_out, &raws(1)).unwrap();

        let report = summary.reports[0];
        let psnr = |m: f64| 20.0 * (1.0 / m.sqrt()).log10();
        assert!((report.mse - 0.015).abs() < 1e-12);
        assert!((report.psnr - (psnr(0.01) + psnr(0.02) + psnr(0.015)) / 3.0).abs() < 1e-12);
        assert!((report.vgg.unwrap() - 0.2).abs() < 1e-12);
        assert!((report.ssim.unwrap() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_short_training_source_is_compute_error() {
        let ws = workspace();
        let mut orch = Orchestrator::new(MockEngine::new(), level(5), 1, 1, &ws.checkpoints, &ws.visuals);
        let err = orch
            .run(&pairs(2).announcing(5), &VecSource::new(vec![0.01]), &raws(1))
            .unwrap_err();
        assert!(matches!(err, TrainError::Compute(_)));
        assert_eq!(orch.engine().steps, 2);
    }

    #[test]
    fn test_memory_sampled_every_fifty_steps() {
        let ws = workspace();
        let calls = Rc::new(Cell::new(0));
        let mut orch = Orchestrator::new(MockEngine::new(), level(5), 1, 1, &ws.checkpoints, &ws.visuals)
            .with_monitor(Box::new(CountingMonitor { calls: calls.clone() }));
        orch.run(&pairs(101), &VecSource::new(vec![0.01]), &raws(1)).unwrap();
        // steps 0, 50, 100
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_metrics_csv_gets_one_row_per_epoch() {
        let ws = workspace();
        let log = MetricsLogger::new(ws.visuals.dir(), level(4)).unwrap();
        let mut orch = Orchestrator::new(MockEngine::new(), level(4), 2, 1, &ws.checkpoints, &ws.visuals)
            .with_metrics_log(&log);
        orch.run(&pairs(2), &VecSource::new(vec![0.01]), &raws(1)).unwrap();

        let text = std::fs::read_to_string(log.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    // ── Write failures ───────────────────────────────────────────────────────

    /// Swap a directory for a plain file so every write under it fails.
    fn block_dir(dir: &std::path::Path) {
        std::fs::remove_dir_all(dir).unwrap();
        std::fs::write(dir, b"").unwrap();
    }

    #[test]
    fn test_checkpoint_write_failure_aborts_run() {
        let ws = workspace();
        block_dir(ws.checkpoints.dir());
        let mut orch = Orchestrator::new(MockEngine::new(), level(5), 2, 1, &ws.checkpoints, &ws.visuals);

        let err = orch.run(&pairs(3), &VecSource::new(vec![0.01]), &raws(1)).unwrap_err();

        assert!(matches!(err, TrainError::Io { .. }));
        assert_eq!(orch.engine().steps, 1);
        assert!(!ws.visuals.path_for(0, level(5), 0).exists());
    }

    #[test]
    fn test_visual_write_failure_aborts_run() {
        let ws = workspace();
        block_dir(ws.visuals.dir());
        let mut orch = Orchestrator::new(MockEngine::new(), level(5), 2, 1, &ws.checkpoints, &ws.visuals);

        let err = orch.run(&pairs(3), &VecSource::new(vec![0.01]), &raws(1)).unwrap_err();

        assert!(matches!(err, TrainError::Io { .. }));
        assert_eq!(orch.engine().steps, 1);
        assert!(ws.checkpoints.path_for(CheckpointKey::new(level(5), 0)).exists());
        assert!(!ws.checkpoints.path_for(CheckpointKey::new(level(5), 1)).exists());
    }

    #[test]
    fn test_metrics_write_failure_aborts_run() {
        let ws = workspace();
        let log = MetricsLogger::new(ws.visuals.dir(), level(5)).unwrap();
        // a directory where the CSV should be cannot be appended to
        std::fs::remove_file(log.csv_path()).unwrap();
        std::fs::create_dir(log.csv_path()).unwrap();
        let mut orch = Orchestrator::new(MockEngine::new(), level(5), 2, 1, &ws.checkpoints, &ws.visuals)
            .with_metrics_log(&log);

        let err = orch.run(&pairs(3), &VecSource::new(vec![0.01]), &raws(1)).unwrap_err();

        assert!(matches!(err, TrainError::Io { .. }));
        assert_eq!(orch.engine().steps, 1);
    }

    // ── Warm start ───────────────────────────────────────────────────────────

    #[test]
    fn test_warm_start_loads_coarser_level() {
        let ws = workspace();
        let mut state = TrainableState::new();
        state.insert("w", ParamTensor::new(vec![1], vec![0.25]).unwrap());
        ws.checkpoints.save(CheckpointKey::new(level(5), 16), &state).unwrap();

        let mut orch = Orchestrator::new(MockEngine::new(), level(4), 1, 1, &ws.checkpoints, &ws.visuals);
        let report = orch.warm_start(Some(16)).unwrap().unwrap();

        assert!(report.is_exact());
        assert_eq!(orch.engine().weight, 0.25);
    }

    #[test]
    fn test_warm_start_tolerates_extra_entries() {
        let ws = workspace();
        let mut state = TrainableState::new();
        state.insert("w", ParamTensor::new(vec![1], vec![0.5]).unwrap());
        state.insert("decoder.5.head.weight", ParamTensor::new(vec![2], vec![0.0, 0.0]).unwrap());
        ws.checkpoints.save(CheckpointKey::new(level(2), 3), &state).unwrap();

        let mut orch = Orchestrator::new(MockEngine::new(), level(1), 1, 1, &ws.checkpoints, &ws.visuals);
        let report = orch.warm_start(Some(3)).unwrap().unwrap();

        assert_eq!(report.applied, vec!["w".to_string()]);
        assert_eq!(report.unexpected, vec!["decoder.5.head.weight".to_string()]);
        assert_eq!(orch.engine().weight, 0.5);
    }

    #[test]
    fn test_coarsest_level_never_warm_starts() {
        let ws = workspace();
        let mut orch = Orchestrator::new(MockEngine::new(), level(5), 1, 1, &ws.checkpoints, &ws.visuals);
        assert!(orch.warm_start(Some(3)).unwrap().is_none());
        assert_eq!(orch.engine().weight, 1.0);
    }

    #[test]
    fn test_warm_start_missing_checkpoint() {
        let ws = workspace();
        let mut orch = Orchestrator::new(MockEngine::new(), level(2), 1, 1, &ws.checkpoints, &ws.visuals);
        let err = orch.warm_start(Some(7)).unwrap_err();
        assert!(matches!(err, TrainError::ResourceUnavailable { .. }));
    }

    #[test]
    fn test_warm_start_requires_restore_epoch() {
        let ws = workspace();
        let mut orch = Orchestrator::new(MockEngine::new(), level(0), 1, 1, &ws.checkpoints, &ws.visuals);
        let err = orch.warm_start(None).unwrap_err();
        assert!(matches!(err, TrainError::Configuration(_)));
    }

    // ── Logging ──────────────────────────────────────────────────────────────

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_epoch_report_is_logged() {
        let ws = workspace();
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut orch = Orchestrator::new(MockEngine::new(), level(5), 1, 1, &ws.checkpoints, &ws.visuals)
                .with_monitor(Box::new(CountingMonitor { calls: Rc::new(Cell::new(0)) }));
            orch.run(&pairs(1), &VecSource::new(vec![0.01]), &raws(1)).unwrap();
        });

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("Epoch 0, mse: 0.0100, psnr: 20.0000"), "{text}");
        assert!(text.contains("GPU memory used: 1024 MiB"), "{text}");
    }
}
