// ============================================================
// Layer 5 — Multi-Scale Structural Similarity
// ============================================================
// MS-SSIM over image batches in [0, 1]:
//
//   for each scale i:
//       ssim_i, cs_i = ssim(a, b) with an 11×11 Gaussian (σ = 1.5)
//       a, b = avg_pool 2×2
//   ms_ssim = Π_{i<last} ((cs_i + 1)/2)^w_i · ((ssim_last + 1)/2)^w_last
//
// Five scales when the image allows it; small images use as many
// as fit and renormalise the weights. The window shrinks to the
// image when the image is smaller than 11 pixels.

use burn::{
    prelude::*,
    tensor::{
        module::{avg_pool2d, conv2d},
        ops::ConvOptions,
    },
};

const SCALE_WEIGHTS: [f64; 5] = [0.0448, 0.2856, 0.3001, 0.2363, 0.1333];
const WINDOW_SIZE: usize = 11;
const SIGMA: f64 = 1.5;
const C1: f64 = 0.01 * 0.01;
const C2: f64 = 0.03 * 0.03;

/// Stateless; the Gaussian window is rebuilt per call on the input's device.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsSsim;

impl MsSsim {
    pub fn new() -> Self {
        Self
    }

    /// Mean MS-SSIM of two `[N, C, H, W]` batches, shape `[1]`.
    pub fn forward<B: Backend>(&self, a: Tensor<B, 4>, b: Tensor<B, 4>) -> Tensor<B, 1> {
        let [_, _, height, width] = a.dims();
        let weights = scale_weights(scale_count(height, width));
        let last = weights.len() - 1;

        let mut a = a;
        let mut b = b;
        let mut result: Option<Tensor<B, 1>> = None;

        for (i, weight) in weights.iter().enumerate() {
            let (ssim, cs) = ssim_and_cs(a.clone(), b.clone());
            let term = if i == last { ssim } else { cs };
            let factor = term.add_scalar(1.0).div_scalar(2.0).powf_scalar(*weight);
            result = Some(match result {
                Some(acc) => acc * factor,
                None => factor,
            });

            if i < last {
                a = avg_pool2d(a, [2, 2], [2, 2], [0, 0], true);
                b = avg_pool2d(b, [2, 2], [2, 2], [0, 0], true);
            }
        }

        // scale_weights never returns an empty list
        result.unwrap_or_else(|| Tensor::ones([1], &a.device()))
    }
}

fn scale_count(height: usize, width: usize) -> usize {
    let mut side = height.min(width);
    let mut scales = 1;
    while scales < SCALE_WEIGHTS.len() && side >= 2 {
        side /= 2;
        scales += 1;
    }
    scales
}

fn scale_weights(scales: usize) -> Vec<f64> {
    let used = &SCALE_WEIGHTS[..scales.clamp(1, SCALE_WEIGHTS.len())];
    let total: f64 = used.iter().sum();
    used.iter().map(|w| w / total).collect()
}

fn gaussian_1d(size: usize) -> Vec<f32> {
    let centre = (size / 2) as f64;
    let raw: Vec<f64> = (0..size)
        .map(|x| (-((x as f64 - centre).powi(2)) / (2.0 * SIGMA * SIGMA)).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.iter().map(|v| (v / sum) as f32).collect()
}

/// Depthwise window `[C, 1, k, k]`.
fn window<B: Backend>(size: usize, channels: usize, device: &B::Device) -> Tensor<B, 4> {
    let g = gaussian_1d(size);
    let mut plane = Vec::with_capacity(size * size * channels);
    for _ in 0..channels {
        for y in &g {
            for x in &g {
                plane.push(y * x);
            }
        }
    }
    Tensor::from_data(TensorData::new(plane, [channels, 1, size, size]), device)
}

fn ssim_and_cs<B: Backend>(a: Tensor<B, 4>, b: Tensor<B, 4>) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let [_, channels, height, width] = a.dims();
    let size = WINDOW_SIZE.min(height).min(width);
    let w = window::<B>(size, channels, &a.device());
    let filter = |x: Tensor<B, 4>| {
        conv2d(x, w.clone(), None, ConvOptions::new([1, 1], [0, 0], [1, 1], channels))
    };

    let mu_a = filter(a.clone());
    let mu_b = filter(b.clone());
    let mu_a_sq = mu_a.clone().powf_scalar(2.0);
    let mu_b_sq = mu_b.clone().powf_scalar(2.0);
    let mu_ab = mu_a * mu_b;

    let sigma_a_sq = filter(a.clone() * a.clone()) - mu_a_sq.clone();
    let sigma_b_sq = filter(b.clone() * b.clone()) - mu_b_sq.clone();
    let sigma_ab = filter(a * b) - mu_ab.clone();

    let v1 = sigma_ab.mul_scalar(2.0).add_scalar(C2);
    let v2 = (sigma_a_sq + sigma_b_sq).add_scalar(C2);
    let cs = (v1.clone() / v2.clone()).mean();

    let numerator = mu_ab.mul_scalar(2.0).add_scalar(C1) * v1;
    let denominator = (mu_a_sq + mu_b_sq).add_scalar(C1) * v2;
    let ssim = (numerator / denominator).mean();

    (ssim, cs)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_identical_images_score_one() {
        let device = Default::default();
        let img = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Uniform(0.0, 1.0), &device);
        let score = scalar(MsSsim::new().forward(img.clone(), img));
        assert!((score - 1.0).abs() < 1e-4, "score = {score}");
    }

    #[test]
    fn test_different_images_score_below_one() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Uniform(0.0, 1.0), &device);
        let b = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Uniform(0.0, 1.0), &device);
        let score = scalar(MsSsim::new().forward(a, b));
        assert!(score < 0.99 && score > 0.0, "score = {score}");
    }

    #[test]
    fn test_scale_count_adapts_to_size() {
        assert_eq!(scale_count(256, 256), 5);
        assert_eq!(scale_count(4, 8), 3);
        assert_eq!(scale_count(1, 1), 1);
    }

    #[test]
    fn test_weights_renormalised() {
        let w = scale_weights(2);
        assert_eq!(w.len(), 2);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((scale_weights(5).iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_is_normalised_and_peaked() {
        let g = gaussian_1d(11);
        assert!((g.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(g[5] > g[4] && g[4] > g[0]);
    }
}
