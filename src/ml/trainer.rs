// ============================================================
// Layer 5 — Burn Training Engine
// ============================================================
// Owns the PyNet model on the autodiff backend and its Adam
// optimiser. Every step starts from fresh gradients: `backward()`
// builds a new gradient set and GradientsParams consumes it, so no
// accumulation carries over between steps.
//
// Evaluation and visual export go through `inference()`, which
// returns `model.valid()` on the inner backend. The training
// module itself is never switched out of training mode.

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::error::TrainResult;
use crate::domain::state::{LoadReport, TrainableState};
use crate::domain::traits::TrainingEngine;
use crate::ml::algebra::BurnAlgebra;
use crate::ml::inferencer::BurnInference;
use crate::ml::model::PyNet;
use crate::ml::params;

pub struct BurnTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PyNet<B>, B>,
{
    model:   PyNet<B>,
    optim:   O,
    lr:      f64,
    algebra: BurnAlgebra<B>,
}

impl<B, O> BurnTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PyNet<B>, B>,
{
    pub fn new(model: PyNet<B>, optim: O, lr: f64, algebra: BurnAlgebra<B>) -> Self {
        Self { model, optim, lr, algebra }
    }
}

impl<B, O> TrainingEngine for BurnTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PyNet<B>, B>,
{
    type Algebra = BurnAlgebra<B>;
    type Inference = BurnInference<B::InnerBackend>;

    fn algebra(&self) -> &BurnAlgebra<B> {
        &self.algebra
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.model.forward(input)
    }

    fn optimize(&mut self, loss: Tensor<B, 1>) -> TrainResult<()> {
        // Backward pass + Adam update
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.lr, self.model.clone(), grads);
        Ok(())
    }

    fn snapshot(&self) -> TrainResult<TrainableState> {
        params::snapshot(&self.model)
    }

    fn restore(&mut self, state: &TrainableState) -> TrainResult<LoadReport> {
        let (model, report) = params::restore(self.model.clone(), state)?;
        self.model = model;
        Ok(report)
    }

    fn inference(&self) -> BurnInference<B::InnerBackend> {
        BurnInference::new(self.model.valid(), self.algebra.valid())
    }
}
