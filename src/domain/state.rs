// ============================================================
// Layer 3 — Trainable State
// ============================================================
// A backend-independent snapshot of every trainable parameter:
//
//   "encoder.0.conv_a.weight" → { shape: [16, 4, 3, 3], values: [...] }
//
// Names are stable across levels, so a level-5 snapshot can seed a
// level-4 model: parameters present in both (same name, same shape)
// are applied; the rest are listed in a LoadReport and ignored.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::error::{TrainError, TrainResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTensor {
    pub shape:  Vec<usize>,
    pub values: Vec<f32>,
}

impl ParamTensor {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> TrainResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(TrainError::compute(format!(
                "parameter of shape {shape:?} needs {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    pub fn numel(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainableState {
    params: BTreeMap<String, ParamTensor>,
}

impl TrainableState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ParamTensor) {
        self.params.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&ParamTensor> {
        self.params.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of scalar parameters.
    pub fn numel(&self) -> usize {
        self.params.values().map(ParamTensor::numel).sum()
    }
}

/// Outcome of a non-strict restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Applied to the model.
    pub applied:    Vec<String>,
    /// Expected by the model, absent from the snapshot.
    pub missing:    Vec<String>,
    /// Present in the snapshot, unknown to the model.
    pub unexpected: Vec<String>,
    /// Same name, different shape; left untouched.
    pub mismatched: Vec<String>,
}

impl LoadReport {
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }

    pub fn log(&self) {
        tracing::info!(
            "Restored {} parameters ({} missing, {} unexpected, {} shape mismatches)",
            self.applied.len(),
            self.missing.len(),
            self.unexpected.len(),
            self.mismatched.len()
        );
        for name in &self.missing {
            tracing::debug!("missing from checkpoint: {name}");
        }
        for name in &self.unexpected {
            tracing::debug!("ignored checkpoint entry: {name}");
        }
        for name in &self.mismatched {
            tracing::warn!("shape mismatch, kept initial value: {name}");
        }
    }
}

/// Hands out matching snapshot entries while a model walks its own
/// parameters, then reports what was left over.
pub struct Restorer<'a> {
    source: &'a TrainableState,
    seen:   BTreeSet<String>,
    report: LoadReport,
}

impl<'a> Restorer<'a> {
    pub fn new(source: &'a TrainableState) -> Self {
        Self { source, seen: BTreeSet::new(), report: LoadReport::default() }
    }

    pub fn take(&mut self, name: &str, shape: &[usize]) -> Option<&'a ParamTensor> {
        self.seen.insert(name.to_string());
        match self.source.get(name) {
            None => {
                self.report.missing.push(name.to_string());
                None
            }
            Some(saved) if saved.shape != shape => {
                self.report.mismatched.push(name.to_string());
                None
            }
            Some(saved) => {
                self.report.applied.push(name.to_string());
                Some(saved)
            }
        }
    }

    pub fn finish(mut self) -> LoadReport {
        self.report.unexpected = self
            .source
            .names()
            .filter(|name| !self.seen.contains(*name))
            .map(str::to_string)
            .collect();
        self.report
    }
}
