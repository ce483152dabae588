// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure in a run falls into one of four classes:
//
//   Configuration       → bad startup parameters (fatal, pre-training)
//   ResourceUnavailable → checkpoint or dataset input absent / corrupt
//   Compute             → malformed batch, non-finite loss, log domain
//   Io                  → checkpoint / image / metrics write failed
//
// None of them is retried. They bubble up with `?` to main(),
// which logs them and exits.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("'{path}' unavailable: {reason}")]
    ResourceUnavailable { path: PathBuf, reason: String },

    #[error("compute error: {0}")]
    Compute(String),

    #[error("i/o error while {action}: {source}")]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

impl TrainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn compute(msg: impl Into<String>) -> Self {
        Self::Compute(msg.into())
    }

    pub fn io(action: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { action: action.into(), source }
    }

    pub fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ResourceUnavailable { path: path.into(), reason: reason.to_string() }
    }
}

pub type TrainResult<T> = Result<T, TrainError>;
