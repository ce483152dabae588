#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Keep the guard alive so the file writer flushes on exit
    let log_guard = match infra::logging::init(&cli.logs_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Cannot set up logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!("Logging to '{}'", log_guard.path().display());

    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
