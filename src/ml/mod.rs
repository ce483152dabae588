// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Burn implementations of the domain seams:
//
//   params.rs      — named parameter walk (snapshot / non-strict restore)
//   model.rs       — the level-conditioned pyramid network
//   perceptual.rs  — frozen VGG-style feature extractor
//   ssim.rs        — multi-scale structural similarity
//   algebra.rs     — LossAlgebra over Burn tensors
//   trainer.rs     — TrainingEngine: forward, Adam step, snapshot
//   inferencer.rs  — InferenceEngine: metrics and rendering
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Ignatov et al. (2020) Replacing Mobile Camera ISP
//            with a Single Deep Learning Model

pub mod params;

pub mod model;

pub mod perceptual;

pub mod ssim;

pub mod algebra;

pub mod trainer;

pub mod inferencer;
