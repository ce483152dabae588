// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Side effects that the training loop triggers but does not own:
//
//   checkpoint.rs — TrainableState snapshots on disk, keyed by
//                   (level, epoch), plus the run config as JSON
//   visuals.rs    — rendered outputs written as JPEG files
//   metrics.rs    — per-epoch evaluation reports appended to CSV
//   logging.rs    — console + size-rotated file tracing layers
//   gpu.rs        — accelerator memory probe via nvidia-smi
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling)

/// Checkpoint saving and loading
pub mod checkpoint;

/// Visual sample export
pub mod visuals;

/// Evaluation metrics CSV logger
pub mod metrics;

/// Tracing subscriber setup
pub mod logging;

/// GPU memory monitor
pub mod gpu;
