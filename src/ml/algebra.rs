// ============================================================
// Layer 5 — Burn Loss Algebra
// ============================================================
// LossAlgebra over Burn tensors. The same struct serves training
// (on the autodiff backend, gradients flow through the frozen
// perceptual net into the model) and evaluation (on the inner
// backend via `valid()`).

use burn::{
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};

use crate::domain::traits::LossAlgebra;
use crate::ml::perceptual::PerceptualNet;
use crate::ml::ssim::MsSsim;

#[derive(Debug, Clone)]
pub struct BurnAlgebra<B: Backend> {
    perceptual: PerceptualNet<B>,
    ms_ssim:    MsSsim,
}

impl<B: Backend> BurnAlgebra<B> {
    pub fn new(perceptual: PerceptualNet<B>) -> Self {
        Self { perceptual, ms_ssim: MsSsim::new() }
    }
}

impl<B: AutodiffBackend> BurnAlgebra<B> {
    /// Same operations on the inner backend, no gradient tracking.
    pub fn valid(&self) -> BurnAlgebra<B::InnerBackend> {
        BurnAlgebra { perceptual: self.perceptual.valid(), ms_ssim: self.ms_ssim }
    }
}

impl<B: Backend> LossAlgebra for BurnAlgebra<B> {
    type Image = Tensor<B, 4>;
    type Scalar = Tensor<B, 1>;

    fn shape(&self, image: &Tensor<B, 4>) -> Vec<usize> {
        image.dims().to_vec()
    }

    fn mse(&self, a: &Tensor<B, 4>, b: &Tensor<B, 4>) -> Tensor<B, 1> {
        MseLoss::new().forward(a.clone(), b.clone(), Reduction::Mean)
    }

    fn perceptual_features(&self, image: &Tensor<B, 4>) -> Tensor<B, 4> {
        self.perceptual.forward(image.clone())
    }

    fn ms_ssim(&self, a: &Tensor<B, 4>, b: &Tensor<B, 4>) -> Tensor<B, 1> {
        self.ms_ssim.forward(a.clone(), b.clone())
    }

    fn scale(&self, value: Tensor<B, 1>, factor: f64) -> Tensor<B, 1> {
        value.mul_scalar(factor)
    }

    fn add(&self, a: Tensor<B, 1>, b: Tensor<B, 1>) -> Tensor<B, 1> {
        a + b
    }

    fn one_minus(&self, value: Tensor<B, 1>) -> Tensor<B, 1> {
        value.neg().add_scalar(1.0)
    }

    fn value(&self, scalar: &Tensor<B, 1>) -> f64 {
        scalar.clone().into_scalar().elem::<f64>()
    }
}
