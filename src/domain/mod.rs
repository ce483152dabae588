// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types and traits describing the training curriculum:
// what a level is, how the loss is assembled, how evaluation
// statistics accumulate, and what a parameter snapshot looks like.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// The ML layer plugs Burn tensors into the traits defined in
// traits.rs; the tests in this layer use plain f64 vectors.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Error taxonomy shared by every layer below the CLI
pub mod error;

/// Curriculum level (0 = finest, 5 = coarsest)
pub mod level;

/// Level-conditioned loss composition
pub mod loss;

/// Held-out evaluation statistics
pub mod metrics;

/// Named parameter snapshots and non-strict restore bookkeeping
pub mod state;

/// 8-bit RGB image produced by inference
pub mod rendered;

// Core abstractions (traits) that other layers implement
pub mod traits;
