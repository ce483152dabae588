// ============================================================
// Layer 2 — Held-out Evaluation
// ============================================================
// One pass over the held-out source with an inference view:
//
//   for each of num_batches samples:
//       measure (mse, optional vgg, optional ms-ssim)
//       accumulate
//   finalize → EvalReport (sums divided by the held-out size)
//
// Used by the orchestrator on step 0 of every epoch and by the
// `evaluate` command for a stored checkpoint.

use crate::domain::error::{TrainError, TrainResult};
use crate::domain::level::Level;
use crate::domain::metrics::{EvalReport, MetricAccumulator};
use crate::domain::traits::{EpochSource, InferenceEngine};

pub fn evaluate<I, S>(
    engine:        &I,
    source:        &S,
    level:         Level,
    held_out_size: usize,
) -> TrainResult<EvalReport>
where
    I: InferenceEngine,
    S: EpochSource<Item = TrainResult<I::Sample>>,
{
    let mut acc     = MetricAccumulator::new(level, held_out_size)?;
    let metrics     = acc.metric_set();
    let announced   = source.num_batches();
    let mut samples = source.epoch();

    for j in 0..announced {
        let sample = samples.next().ok_or_else(|| {
            TrainError::compute(format!(
                "held-out source ended after {j} of {announced} samples"
            ))
        })??;
        acc.record(&engine.measure(sample, metrics)?)?;
    }

    Ok(acc.finalize())
}
