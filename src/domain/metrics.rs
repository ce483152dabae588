// ============================================================
// Layer 3 — Evaluation Metrics
// ============================================================
// Running sums over one held-out pass. Each sample contributes:
//
//   mse   — always
//   psnr  — 20·log10(1 / sqrt(mse)), always (mse must be > 0)
//   vgg   — perceptual mse, levels < 5
//   ssim  — ms-ssim, levels 0 and 1
//
// finalize() divides every sum by the held-out set size given at
// construction, NOT by the number of samples recorded. A pass that
// records fewer samples therefore reports a biased average; this
// mirrors the fixed TEST_SIZE denominator of the training schedule.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{TrainError, TrainResult};
use crate::domain::level::Level;

/// Which optional metrics a pass needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSet {
    pub vgg:  bool,
    pub ssim: bool,
}

impl MetricSet {
    pub fn for_level(level: Level) -> Self {
        Self { vgg: level.uses_perceptual(), ssim: level.uses_ssim_metric() }
    }
}

/// Measurements for one held-out sample, already plain numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleMetrics {
    pub mse:  f64,
    pub vgg:  Option<f64>,
    pub ssim: Option<f64>,
}

pub fn psnr_from_mse(mse: f64) -> TrainResult<f64> {
    if !(mse > 0.0 && mse.is_finite()) {
        return Err(TrainError::compute(format!(
            "psnr undefined for mse = {mse}"
        )));
    }
    Ok(20.0 * (1.0 / mse.sqrt()).log10())
}

#[derive(Debug)]
pub struct MetricAccumulator {
    level:         Level,
    metrics:       MetricSet,
    held_out_size: usize,
    recorded:      usize,
    mse_sum:       f64,
    psnr_sum:      f64,
    vgg_sum:       f64,
    ssim_sum:      f64,
}

impl MetricAccumulator {
    pub fn new(level: Level, held_out_size: usize) -> TrainResult<Self> {
        if held_out_size == 0 {
            return Err(TrainError::config("held-out set size must be positive"));
        }
        Ok(Self {
            level,
            metrics: MetricSet::for_level(level),
            held_out_size,
            recorded: 0,
            mse_sum: 0.0,
            psnr_sum: 0.0,
            vgg_sum: 0.0,
            ssim_sum: 0.0,
        })
    }

    pub fn metric_set(&self) -> MetricSet {
        self.metrics
    }

    #[cfg(test)]
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    pub fn record(&mut self, sample: &SampleMetrics) -> TrainResult<()> {
        let psnr = psnr_from_mse(sample.mse)?;

        if self.metrics.vgg {
            self.vgg_sum += require(sample.vgg, "vgg")?;
        }
        if self.metrics.ssim {
            self.ssim_sum += require(sample.ssim, "ms-ssim")?;
        }
        self.mse_sum += sample.mse;
        self.psnr_sum += psnr;
        self.recorded += 1;
        Ok(())
    }

    pub fn finalize(self) -> EvalReport {
        let n = self.held_out_size as f64;
        if self.recorded != self.held_out_size {
            tracing::debug!(
                "averaging {} recorded samples over a held-out size of {}",
                self.recorded,
                self.held_out_size
            );
        }
        EvalReport {
            level: self.level,
            mse:   self.mse_sum / n,
            psnr:  self.psnr_sum / n,
            vgg:   self.metrics.vgg.then(|| self.vgg_sum / n),
            ssim:  self.metrics.ssim.then(|| self.ssim_sum / n),
        }
    }
}

fn require(value: Option<f64>, name: &str) -> TrainResult<f64> {
    value.ok_or_else(|| TrainError::compute(format!("evaluation sample is missing the {name} term")))
}

/// Averages reported once per epoch. Optional fields are present
/// exactly when the level reports them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub level: Level,
    pub mse:   f64,
    pub psnr:  f64,
    pub vgg:   Option<f64>,
    pub ssim:  Option<f64>,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mse: {:.4}, psnr: {:.4}", self.mse, self.psnr)?;
        if let Some(vgg) = self.vgg {
            write!(f, ", vgg: {vgg:.4}")?;
        }
        if let Some(ssim) = self.ssim {
            write!(f, ", ms-ssim: {ssim:.4}")?;
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn level(l: u8) -> Level {
        Level::new(l).unwrap()
    }

    fn sample(mse: f64) -> SampleMetrics {
        SampleMetrics { mse, vgg: Some(0.5), ssim: Some(0.9) }
    }

    #[test]
    fn test_psnr_formula() {
        assert!((psnr_from_mse(0.01).unwrap() - 20.0).abs() < 1e-12);
        assert!((psnr_from_mse(1.0).unwrap() - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_psnr_rejects_non_positive_mse() {
        assert!(matches!(psnr_from_mse(0.0), Err(TrainError::Compute(_))));
        assert!(psnr_from_mse(-1.0).is_err());
        assert!(psnr_from_mse(f64::NAN).is_err());
    }

    #[test]
    fn test_averages_three_samples() {
        let mut acc = MetricAccumulator::new(level(0), 3).unwrap();
        let mses = [0.01, 0.02, 0.015];
        for m in mses {
            acc.record(&sample(m)).unwrap();
        }
        let report = acc.finalize();

        assert!((report.mse - 0.015).abs() < 1e-15);
        let expected_psnr: f64 =
            mses.iter().map(|m| 20.0 * (1.0 / m.sqrt()).log10()).sum::<f64>() / 3.0;
        assert!((report.psnr - expected_psnr).abs() < 1e-12);
        assert!((report.vgg.unwrap() - 0.5).abs() < 1e-12);
        assert!((report.ssim.unwrap() - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_divides_by_held_out_size_not_by_recorded() {
        let mut acc = MetricAccumulator::new(level(5), 4).unwrap();
        acc.record(&sample(0.02)).unwrap();
        acc.record(&sample(0.02)).unwrap();
        assert_eq!(acc.recorded(), 2);
        assert!((acc.finalize().mse - 0.01).abs() < 1e-15);
    }

    #[test]
    fn test_report_granularity_by_level() {
        let finest = MetricAccumulator::new(level(1), 1).unwrap().finalize();
        assert!(finest.vgg.is_some() && finest.ssim.is_some());

        let mid = MetricAccumulator::new(level(3), 1).unwrap().finalize();
        assert!(mid.vgg.is_some() && mid.ssim.is_none());

        let coarse = MetricAccumulator::new(level(5), 1).unwrap().finalize();
        assert!(coarse.vgg.is_none() && coarse.ssim.is_none());
    }

    #[test]
    fn test_ignores_terms_the_level_does_not_report() {
        let mut acc = MetricAccumulator::new(level(5), 1).unwrap();
        acc.record(&SampleMetrics { mse: 0.1, vgg: None, ssim: None }).unwrap();
        let report = acc.finalize();
        assert_eq!(report.to_string(), format!("mse: 0.1000, psnr: {:.4}", report.psnr));
    }

    #[test]
    fn test_missing_required_term_is_error() {
        let mut acc = MetricAccumulator::new(level(2), 1).unwrap();
        let err = acc.record(&SampleMetrics { mse: 0.1, vgg: None, ssim: None });
        assert!(err.is_err());
    }

    #[test]
    fn test_display_matches_log_format() {
        let report = EvalReport { level: level(0), mse: 0.015, psnr: 18.3, vgg: Some(0.25), ssim: Some(0.9) };
        assert_eq!(report.to_string(), "mse: 0.0150, psnr: 18.3000, vgg: 0.2500, ms-ssim: 0.9000");
    }

    #[test]
    fn test_zero_held_out_size_rejected() {
        assert!(MetricAccumulator::new(level(0), 0).is_err());
    }
}
