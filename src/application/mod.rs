// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor math, no file formats,
// no argument parsing.
//
//   orchestrator.rs      — per-level epoch loop and its step-0
//                          side effects (checkpoint, visuals, eval)
//   evaluation.rs        — one held-out pass → EvalReport
//   train_use_case.rs    — config, backend choice, wiring, run
//   evaluate_use_case.rs — score a stored checkpoint
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

pub mod orchestrator;

pub mod evaluation;

// The training workflow
pub mod train_use_case;

// Scoring a saved checkpoint
pub mod evaluate_use_case;
