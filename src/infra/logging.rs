// ============================================================
// Layer 6 — Logging Setup
// ============================================================
// Two tracing layers, installed once by main():
//
//   console  human-readable, stderr
//   file     logs/train_model_<YYYYmmdd_HHMMSS>.log, rotated at
//            1 MiB with 5 backups, written from a background thread
//
// Both default to `pynet_trainer=debug`; RUST_LOG overrides.
// The returned guard flushes the file writer when dropped, so main
// keeps it alive until exit.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_FILTER: &str = "pynet_trainer=debug";
pub const MAX_LOG_BYTES: u64 = 1024 * 1024;
pub const LOG_BACKUPS: usize = 5;

pub struct LogGuard {
    _worker: WorkerGuard,
    path:    PathBuf,
}

impl LogGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("train_model_{}.log", started.format("%Y%m%d_%H%M%S"))
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init(log_dir: &Path) -> Result<LogGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Cannot create log directory '{}'", log_dir.display()))?;
    let path = log_dir.join(log_file_name(Local::now()));

    let appender = BasicRollingFileAppender::new(
        &path,
        RollingConditionBasic::new().max_size(MAX_LOG_BYTES),
        LOG_BACKUPS,
    )
    .with_context(|| format!("Cannot open log file '{}'", path.display()))?;
    let (writer, worker) = tracing_appender::non_blocking(appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter());

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LogGuard { _worker: worker, path })
}
