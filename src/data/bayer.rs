// ============================================================
// Layer 4 — Bayer Packing
// ============================================================
// A mono Bayer mosaic (H × W, 10-bit values stored as 16-bit PNG)
// becomes a 4-channel planar image at half resolution:
//
//   row 0:  R  Gb R  Gb ...        channel 0: B   (odd row,  odd col)
//   row 1:  Gr B  Gr B  ...        channel 1: Gb  (even row, odd col)
//                                  channel 2: R   (even row, even col)
//                                  channel 3: Gr  (odd row,  even col)
//
// Values are divided by 4·255 so the 10-bit range maps onto ~[0, 1].

use crate::domain::error::{TrainError, TrainResult};

pub const BAYER_NORM: f32 = 4.0 * 255.0;

/// Channel-major `[C, H, W]` float image.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarImage {
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
    pub values:   Vec<f32>,
}

impl PlanarImage {
    pub fn dims(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

/// Pack a mono Bayer mosaic into (B, Gb, R, Gr).
pub fn pack_bayer(raw: &[u16], width: usize, height: usize) -> TrainResult<PlanarImage> {
    if width % 2 != 0 || height % 2 != 0 {
        return Err(TrainError::compute(format!(
            "bayer mosaic must have even dimensions, got {width}x{height}"
        )));
    }
    if raw.len() != width * height {
        return Err(TrainError::compute(format!(
            "bayer mosaic of {width}x{height} needs {} samples, got {}",
            width * height,
            raw.len()
        )));
    }

    let (h, w) = (height / 2, width / 2);
    let area = h * w;
    let mut values = vec![0.0f32; 4 * area];

    // (row offset, col offset) per output channel
    let offsets = [(1, 1), (0, 1), (0, 0), (1, 0)];
    for (channel, (dy, dx)) in offsets.iter().enumerate() {
        for y in 0..h {
            let src_row = (2 * y + dy) * width;
            let dst_row = channel * area + y * w;
            for x in 0..w {
                values[dst_row + x] = raw[src_row + 2 * x + dx] as f32 / BAYER_NORM;
            }
        }
    }

    Ok(PlanarImage { channels: 4, height: h, width: w, values })
}

/// Centred crop window `(x, y, w, h)` of a mosaic such that the packed
/// result is a multiple of `multiple` on both sides. Offsets stay even
/// so the colour pattern is preserved.
pub fn centre_crop_window(
    width:    usize,
    height:   usize,
    multiple: usize,
) -> TrainResult<(usize, usize, usize, usize)> {
    let step = 2 * multiple;
    let crop_w = width / step * step;
    let crop_h = height / step * step;
    if crop_w == 0 || crop_h == 0 {
        return Err(TrainError::compute(format!(
            "{width}x{height} mosaic is smaller than one {step}x{step} tile"
        )));
    }
    let x = (width - crop_w) / 2 / 2 * 2;
    let y = (height - crop_h) / 2 / 2 * 2;
    Ok((x, y, crop_w, crop_h))
}

/// Copy a window out of a row-major mosaic.
pub fn crop(raw: &[u16], width: usize, window: (usize, usize, usize, usize)) -> Vec<u16> {
    let (x, y, w, h) = window;
    let mut out = Vec::with_capacity(w * h);
    for row in y..y + h {
        out.extend_from_slice(&raw[row * width + x..row * width + x + w]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_channel_order() {
        // 2x2 mosaic: [R, Gb; Gr, B]
        let raw = [10u16, 20, 30, 40];
        let packed = pack_bayer(&raw, 2, 2).unwrap();
        let expected: Vec<f32> = [40.0, 20.0, 10.0, 30.0].iter().map(|v| v / BAYER_NORM).collect();
        assert_eq!(packed.dims(), [4, 1, 1]);
        assert_eq!(packed.values, expected);
    }

    #[test]
    fn test_pack_halves_resolution() {
        let raw: Vec<u16> = (0..4 * 6).map(|v| v as u16).collect();
        let packed = pack_bayer(&raw, 6, 4).unwrap();
        assert_eq!(packed.dims(), [4, 2, 3]);
        // R channel, second row, third column → raw (2, 4)
        assert_eq!(packed.values[2 * 6 + 3 + 2], (2 * 6 + 4) as f32 / BAYER_NORM);
    }

    #[test]
    fn test_full_scale_maps_near_one() {
        let packed = pack_bayer(&[1020u16; 4], 2, 2).unwrap();
        assert!(packed.values.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_pack_rejects_odd_or_short_input() {
        assert!(pack_bayer(&[0u16; 6], 3, 2).is_err());
        assert!(pack_bayer(&[0u16; 3], 2, 2).is_err());
    }

    #[test]
    fn test_centre_crop_window() {
        // 150 wide: 128 kept, 22 spare → offset 11 rounded down to 10
        assert_eq!(centre_crop_window(150, 64, 32).unwrap(), (10, 0, 128, 64));
        assert!(centre_crop_window(40, 64, 32).is_err());
    }

    #[test]
    fn test_crop_copies_window() {
        let raw: Vec<u16> = (0..16).collect();
        assert_eq!(crop(&raw, 4, (2, 2, 2, 2)), vec![10, 11, 14, 15]);
    }
}
