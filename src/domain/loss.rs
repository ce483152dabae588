// ============================================================
// Layer 3 — Loss Composition
// ============================================================
// Turns (output, target) into the scalar objective for the current
// level. The level → formula mapping is a closed enum:
//
//   PixelOnly   (levels 4, 5)  total = mse
//   Perceptual  (levels 1..3)  total = 10·mse + content
//   Structural  (level 0)      total = mse + content + 0.4·(1 − ms_ssim)
//
// content = mse(φ(output), φ(target)) where φ is the perceptual
// feature extractor. φ is never called at level 5. Level 4 still
// computes content (it is logged) but does not train on it.

use std::fmt;

use crate::domain::error::{TrainError, TrainResult};
use crate::domain::level::Level;
use crate::domain::traits::LossAlgebra;

pub const PERCEPTUAL_MSE_WEIGHT: f64 = 10.0;
pub const SSIM_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossPolicy {
    PixelOnly,
    Perceptual,
    Structural,
}

impl LossPolicy {
    pub fn for_level(level: Level) -> Self {
        match level.get() {
            0 => LossPolicy::Structural,
            1..=3 => LossPolicy::Perceptual,
            _ => LossPolicy::PixelOnly,
        }
    }
}

/// Plain-number view of one step's loss, for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossTerms {
    pub mse:     f64,
    pub content: Option<f64>,
    pub ssim:    Option<f64>,
    pub total:   f64,
}

impl fmt::Display for LossTerms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "total: {:.6}, mse: {:.6}", self.total, self.mse)?;
        if let Some(content) = self.content {
            write!(f, ", content: {content:.6}")?;
        }
        if let Some(ssim) = self.ssim {
            write!(f, ", ms-ssim: {ssim:.6}")?;
        }
        Ok(())
    }
}

/// The differentiable total plus its logged terms.
#[derive(Debug)]
pub struct Objective<S> {
    pub total: S,
    pub terms: LossTerms,
}

#[derive(Debug, Clone, Copy)]
pub struct LossComposer {
    level:  Level,
    policy: LossPolicy,
}

impl LossComposer {
    pub fn new(level: Level) -> Self {
        Self { level, policy: LossPolicy::for_level(level) }
    }

    pub fn compose<A: LossAlgebra>(
        &self,
        algebra: &A,
        output:  &A::Image,
        target:  &A::Image,
    ) -> TrainResult<Objective<A::Scalar>> {
        let output_shape = algebra.shape(output);
        let target_shape = algebra.shape(target);
        if output_shape != target_shape {
            return Err(TrainError::compute(format!(
                "malformed batch: output shape {output_shape:?} does not match target shape {target_shape:?}"
            )));
        }

        let mse = algebra.mse(output, target);

        let (total, content, ssim) = match self.policy {
            LossPolicy::PixelOnly => {
                let content = self
                    .level
                    .uses_perceptual()
                    .then(|| content_loss(algebra, output, target));
                (mse.clone(), content, None)
            }
            LossPolicy::Perceptual => {
                let content = content_loss(algebra, output, target);
                let total = algebra.add(
                    algebra.scale(mse.clone(), PERCEPTUAL_MSE_WEIGHT),
                    content.clone(),
                );
                (total, Some(content), None)
            }
            LossPolicy::Structural => {
                let content = content_loss(algebra, output, target);
                let ssim = algebra.ms_ssim(output, target);
                let structural = algebra.scale(algebra.one_minus(ssim.clone()), SSIM_WEIGHT);
                let total = algebra.add(algebra.add(mse.clone(), content.clone()), structural);
                (total, Some(content), Some(ssim))
            }
        };

        let terms = LossTerms {
            mse:     algebra.value(&mse),
            content: content.as_ref().map(|c| algebra.value(c)),
            ssim:    ssim.as_ref().map(|s| algebra.value(s)),
            total:   algebra.value(&total),
        };

        if !terms.total.is_finite() {
            return Err(TrainError::compute(format!("non-finite loss at level {}: {terms}", self.level)));
        }

        Ok(Objective { total, terms })
    }
}

fn content_loss<A: LossAlgebra>(algebra: &A, output: &A::Image, target: &A::Image) -> A::Scalar {
    let output_features = algebra.perceptual_features(output);
    let target_features = algebra.perceptual_features(target);
    algebra.mse(&output_features, &target_features)
}
