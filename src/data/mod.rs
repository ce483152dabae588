// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From files on disk to device-ready tensor batches:
//
//   huawei_raw/*.png + canon/*.jpg
//       │
//       ▼
//   loader     → decodes PNG / JPEG, packs Bayer, rescales targets
//       │
//       ▼
//   dataset    → Burn Dataset over indexed pairs / visual inputs
//       │
//       ▼
//   batcher    → stacks planar images into [N, C, H, W] tensors
//       │
//       ▼
//   source     → DataLoader wrapped as an EpochSource
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Bayer mosaic packing and cropping
pub mod bayer;

/// Dataset layout and image decoding
pub mod loader;

/// Burn Dataset implementations
pub mod dataset;

/// Burn Batcher implementations
pub mod batcher;

/// DataLoader-backed epoch sources
pub mod source;
