// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with clap.
// All work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — train one curriculum level
//   2. `evaluate` — score a saved checkpoint
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "pynet-trainer",
    version,
    about = "Train a PyNET-style RAW-to-RGB network one resolution level at a time."
)]
pub struct Cli {
    /// Directory for the rotating log files
    #[arg(long, global = true, default_value = "logs")]
    pub logs_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route to the matching use case. Nothing is computed here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting level {} training on '{}'", args.level, args.dataset_dir.display());
    let summary = TrainUseCase::new(args.into()).execute()?;

    match summary.reports.last() {
        Some(last) => println!(
            "Training complete: {} steps, {} checkpoints. Last evaluation: {last}",
            summary.optimizer_steps, summary.checkpoints_saved
        ),
        None => println!("Training complete: no epochs were run."),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.into()).execute()?;
    println!("Level {}: {report}", report.level);
    Ok(())
}
