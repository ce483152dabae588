// ============================================================
// Layer 5 — Inference Engine
// ============================================================
// Gradient-free evaluation and rendering on a plain (non-autodiff)
// backend. Built either from a training engine's `valid()` view or
// directly from a checkpoint for the `evaluate` command.

use burn::prelude::*;

use crate::domain::error::{TrainError, TrainResult};
use crate::domain::metrics::{MetricSet, SampleMetrics};
use crate::domain::rendered::RenderedImage;
use crate::domain::traits::{InferenceEngine, LossAlgebra, TrainPair};
use crate::ml::algebra::BurnAlgebra;
use crate::ml::model::PyNet;

pub struct BurnInference<B: Backend> {
    model:   PyNet<B>,
    algebra: BurnAlgebra<B>,
}

impl<B: Backend> BurnInference<B> {
    pub fn new(model: PyNet<B>, algebra: BurnAlgebra<B>) -> Self {
        Self { model, algebra }
    }

    #[cfg(test)]
    pub fn model(&self) -> &PyNet<B> {
        &self.model
    }
}

impl<B: Backend> InferenceEngine for BurnInference<B> {
    type Sample = TrainPair<Tensor<B, 4>>;
    type Raw = Tensor<B, 4>;

    fn measure(&self, sample: TrainPair<Tensor<B, 4>>, metrics: MetricSet) -> TrainResult<SampleMetrics> {
        let output = self.model.forward(sample.input);
        if output.dims() != sample.target.dims() {
            return Err(TrainError::compute(format!(
                "evaluation output {:?} does not match target {:?}",
                output.dims(),
                sample.target.dims()
            )));
        }

        let alg = &self.algebra;
        let mse = alg.value(&alg.mse(&output, &sample.target));

        let vgg = metrics.vgg.then(|| {
            let out_features = alg.perceptual_features(&output);
            let tgt_features = alg.perceptual_features(&sample.target);
            alg.value(&alg.mse(&out_features, &tgt_features))
        });

        // Converted to f64 right away; nothing tensor-valued is kept.
        let ssim = metrics
            .ssim
            .then(|| alg.value(&alg.ms_ssim(&sample.target, &output)));

        Ok(SampleMetrics { mse, vgg, ssim })
    }

    fn render(&self, raw: Tensor<B, 4>) -> TrainResult<RenderedImage> {
        let output = self.model.forward(raw);
        let [_, _, height, width] = output.dims();
        let first = output.slice([0..1]);
        let planes = first
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| TrainError::compute(format!("cannot read rendered image: {e:?}")))?;
        RenderedImage::from_planar(width, height, &planes)
    }
}
