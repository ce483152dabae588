// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between the training loop and the tensor backend.
//
//   LossAlgebra     → the handful of differentiable operations the
//                     loss policy needs (mse, features, ms-ssim, +, ×)
//   TrainingEngine  → model + optimiser: forward, optimise, snapshot,
//                     restore, and an inference-mode view
//   InferenceEngine → gradient-free evaluation and rendering
//   EpochSource     → a finite, restartable batch sequence
//   ResourceMonitor → optional accelerator-memory probe
//
// The ML layer implements these with Burn tensors; the orchestrator
// tests implement them with plain f64 vectors.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use crate::domain::error::TrainResult;
use crate::domain::metrics::{MetricSet, SampleMetrics};
use crate::domain::rendered::RenderedImage;
use crate::domain::state::{LoadReport, TrainableState};

// ─── LossAlgebra ──────────────────────────────────────────────────────────────
/// Differentiable operations over a backend's image batches and scalars.
pub trait LossAlgebra {
    /// A batch of images, `[N, C, H, W]`.
    type Image;
    /// A differentiable scalar.
    type Scalar: Clone;

    fn shape(&self, image: &Self::Image) -> Vec<usize>;

    /// Mean squared error between two batches of equal shape.
    fn mse(&self, a: &Self::Image, b: &Self::Image) -> Self::Scalar;

    /// High-level features of a batch (normalisation included).
    fn perceptual_features(&self, image: &Self::Image) -> Self::Image;

    /// Multi-scale structural similarity in [0, 1].
    fn ms_ssim(&self, a: &Self::Image, b: &Self::Image) -> Self::Scalar;

    fn scale(&self, value: Self::Scalar, factor: f64) -> Self::Scalar;

    fn add(&self, a: Self::Scalar, b: Self::Scalar) -> Self::Scalar;

    /// `1 - value`
    fn one_minus(&self, value: Self::Scalar) -> Self::Scalar;

    /// Plain number for logging and metrics.
    fn value(&self, scalar: &Self::Scalar) -> f64;
}

/// Aligned input / target batch.
#[derive(Debug, Clone)]
pub struct TrainPair<I> {
    pub input:  I,
    pub target: I,
}

pub type EngineImage<E> = <<E as TrainingEngine>::Algebra as LossAlgebra>::Image;
pub type EngineScalar<E> = <<E as TrainingEngine>::Algebra as LossAlgebra>::Scalar;

// ─── TrainingEngine ───────────────────────────────────────────────────────────
/// Owns the trainable model and its optimiser.
///
/// The model stays in training mode for the engine's whole life.
/// Inference work goes through the view returned by `inference()`,
/// so nothing has to be switched back afterwards.
pub trait TrainingEngine {
    type Algebra: LossAlgebra;
    type Inference: InferenceEngine;

    fn algebra(&self) -> &Self::Algebra;

    fn forward(&self, input: EngineImage<Self>) -> EngineImage<Self>;

    /// Backpropagate `loss` from fresh gradients and apply one optimiser step.
    fn optimize(&mut self, loss: EngineScalar<Self>) -> TrainResult<()>;

    fn snapshot(&self) -> TrainResult<TrainableState>;

    /// Non-strict restore: apply the parameters whose names and shapes
    /// match, report everything else.
    fn restore(&mut self, state: &TrainableState) -> TrainResult<LoadReport>;

    /// Gradient-free view of the current parameters.
    fn inference(&self) -> Self::Inference;
}

// ─── InferenceEngine ──────────────────────────────────────────────────────────
pub trait InferenceEngine {
    /// One held-out (input, target) sample, batch size 1.
    type Sample;
    /// One unpaired visual input, batch size 1.
    type Raw;

    fn measure(&self, sample: Self::Sample, metrics: MetricSet) -> TrainResult<SampleMetrics>;

    fn render(&self, raw: Self::Raw) -> TrainResult<RenderedImage>;
}

// ─── EpochSource ──────────────────────────────────────────────────────────────
/// A finite batch sequence that can be replayed once per epoch.
///
/// `num_batches` is the number of items a consumer should pull;
/// the iterator may hold more (an incomplete final batch is simply
/// never requested).
pub trait EpochSource {
    type Item;

    fn num_batches(&self) -> usize;

    fn epoch(&self) -> Box<dyn Iterator<Item = Self::Item> + '_>;
}

// ─── ResourceMonitor ──────────────────────────────────────────────────────────
/// Read-only probe of accelerator memory. Absent or failing monitors
/// only cost observability.
pub trait ResourceMonitor {
    fn used_memory_mib(&self) -> Option<f64>;
}
