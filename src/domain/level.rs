// ============================================================
// Layer 3 — Level
// ============================================================
// The curriculum index. Level 5 is the coarsest stage (1/16 of
// the packed RAW resolution), level 0 the finest (2x upsampled).
// A Level value is always inside 0..=MAX_LEVEL; the only way to
// build one is Level::new, which rejects anything else.
//
// Per-level behaviour:
//
//   level │ output scale │ perceptual │ ms-ssim metric │ loss
//   ──────┼──────────────┼────────────┼────────────────┼──────────────────────
//     5   │    1/16      │     no     │       no       │ mse
//     4   │    1/8       │    yes     │       no       │ mse
//    3..2 │  1/4, 1/2    │    yes     │       no       │ 10·mse + content
//     1   │     1        │    yes     │      yes       │ 10·mse + content
//     0   │     2        │    yes     │      yes       │ mse + content + ssim

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{TrainError, TrainResult};

/// Index of the coarsest level.
pub const MAX_LEVEL: u8 = 5;

/// Packed inputs must be a multiple of this on both sides: the encoder
/// halves the resolution once per level below the finest.
pub const PACKED_MULTIPLE: usize = 1 << (MAX_LEVEL - 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub fn new(value: u8) -> TrainResult<Self> {
        if value > MAX_LEVEL {
            return Err(TrainError::config(format!(
                "level {value} is outside the implemented range 0..={MAX_LEVEL}"
            )));
        }
        Ok(Self(value))
    }

    pub fn coarsest() -> Self {
        Self(MAX_LEVEL)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_coarsest(self) -> bool {
        self.0 == MAX_LEVEL
    }

    /// The level whose checkpoint seeds this one, if any.
    pub fn coarser(self) -> Option<Level> {
        (!self.is_coarsest()).then(|| Level(self.0 + 1))
    }

    /// `1 / 2^(level - 1)`: 2.0 at level 0, 1/16 at level 5.
    pub fn dslr_scale(self) -> f64 {
        2f64.powi(1 - self.0 as i32)
    }

    /// Resize factor applied to the full-resolution DSLR target.
    pub fn target_scale(self) -> f64 {
        self.dslr_scale() / 2.0
    }

    /// Whether perceptual features are extracted at this level.
    pub fn uses_perceptual(self) -> bool {
        self.0 < MAX_LEVEL
    }

    /// Whether MS-SSIM is accumulated during evaluation.
    pub fn uses_ssim_metric(self) -> bool {
        self.0 < 2
    }
}

impl TryFrom<u8> for Level {
    type Error = TrainError;

    fn try_from(value: u8) -> TrainResult<Self> {
        Level::new(value)
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        level.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Recommended schedule ────────────────────────────────────────────────────
// Batch sizes and epoch counts used when the operator does not
// override them. Out-of-range levels fall back to the coarsest
// row; they are rejected later by Level::new anyway.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDefaults {
    pub batch_size: usize,
    pub epochs:     usize,
}

pub fn defaults_for(level: u8) -> LevelDefaults {
    let (batch_size, epochs) = match level {
        0 => (10, 10),
        1 => (12, 12),
        2 => (18, 18),
        3 => (48, 17),
        _ => (50, 17),
    };
    LevelDefaults { batch_size, epochs }
}

/// Last epoch written by the coarser level under the default
/// schedule; `None` for the coarsest level.
pub fn default_restore_epoch(level: u8) -> Option<usize> {
    if level >= MAX_LEVEL {
        return None;
    }
    Some(defaults_for(level + 1).epochs.saturating_sub(1))
}
