// ============================================================
// Layer 3 — Rendered Image
// ============================================================
// Interleaved 8-bit RGB pixels produced from a planar [3, H, W]
// float image in [0, 1]. Values are clamped, scaled by 255 and
// truncated, the same conversion a float → byte image cast does.

use crate::domain::error::{TrainError, TrainResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub width:  u32,
    pub height: u32,
    /// Row-major RGBRGB...
    pub rgb:    Vec<u8>,
}

impl RenderedImage {
    pub fn from_planar(width: usize, height: usize, planes: &[f32]) -> TrainResult<Self> {
        let area = width * height;
        if planes.len() < 3 * area {
            return Err(TrainError::compute(format!(
                "expected {} planar values for a {width}x{height} RGB image, got {}",
                3 * area,
                planes.len()
            )));
        }

        let mut rgb = Vec::with_capacity(3 * area);
        for pixel in 0..area {
            for channel in 0..3 {
                let v = planes[channel * area + pixel].clamp(0.0, 1.0);
                rgb.push((v * 255.0) as u8);
            }
        }

        Ok(Self { width: width as u32, height: height as u32, rgb })
    }
}
