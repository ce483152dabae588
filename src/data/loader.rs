// ============================================================
// Layer 4 — Image Loader
// ============================================================
// Reads the on-disk dataset with the `image` crate:
//
//   <root>/train/huawei_raw/<i>.png   16-bit mono Bayer mosaic
//   <root>/train/canon/<i>.jpg        8-bit RGB target
//   <root>/test/...                   same layout, held-out set
//   <root>/test/huawei_full_resolution/*.png   visual inputs
//
// Per-file failures are returned as LoadFailure values instead of
// panicking inside a data-loader worker; they become TrainError at
// batch time.

use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage};
use thiserror::Error;

use crate::data::bayer::{centre_crop_window, crop, pack_bayer, PlanarImage};
use crate::domain::error::{TrainError, TrainResult};
use crate::domain::level::PACKED_MULTIPLE;

/// Packed visual inputs are cropped to a multiple of this.
pub const VISUAL_MULTIPLE: usize = 32;

#[derive(Debug, Clone, Error)]
#[error("cannot load '{path}': {reason}")]
pub struct LoadFailure {
    pub path:   PathBuf,
    pub reason: String,
}

impl LoadFailure {
    pub fn new(path: &Path, reason: impl ToString) -> Self {
        Self { path: path.to_path_buf(), reason: reason.to_string() }
    }
}

impl From<LoadFailure> for TrainError {
    fn from(f: LoadFailure) -> Self {
        TrainError::Compute(f.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn dir_name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    /// Fails when the dataset root does not exist.
    pub fn open(root: impl Into<PathBuf>) -> TrainResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(TrainError::config(format!(
                "dataset directory '{}' does not exist",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn raw_path(&self, split: Split, index: usize) -> PathBuf {
        self.root.join(split.dir_name()).join("huawei_raw").join(format!("{index}.png"))
    }

    pub fn target_path(&self, split: Split, index: usize) -> PathBuf {
        self.root.join(split.dir_name()).join("canon").join(format!("{index}.jpg"))
    }

    pub fn visual_dir(&self) -> PathBuf {
        self.root.join("test").join("huawei_full_resolution")
    }

    /// First `count` PNGs of the visual directory in name order.
    pub fn visual_paths(&self, count: usize) -> TrainResult<Vec<PathBuf>> {
        let dir = self.visual_dir();
        let entries = fs::read_dir(&dir).map_err(|e| TrainError::unavailable(&dir, e))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
            .collect();
        paths.sort();
        paths.truncate(count);

        if paths.len() < count {
            tracing::warn!(
                "Only {} visual inputs found in '{}' ({} requested)",
                paths.len(),
                dir.display(),
                count
            );
        }
        Ok(paths)
    }
}

/// Read a 16-bit Bayer PNG and pack it. Both packed sides must be a
/// multiple of `PACKED_MULTIPLE`.
pub fn read_raw(path: &Path) -> Result<PlanarImage, LoadFailure> {
    let (width, height, mosaic) = read_mosaic(path)?;
    let packed = pack_bayer(&mosaic, width, height).map_err(|e| LoadFailure::new(path, e))?;
    if packed.height % PACKED_MULTIPLE != 0 || packed.width % PACKED_MULTIPLE != 0 {
        return Err(LoadFailure::new(
            path,
            format!(
                "packed size {}x{} is not a multiple of {PACKED_MULTIPLE}",
                packed.width, packed.height
            ),
        ));
    }
    Ok(packed)
}

/// Read a full-resolution Bayer PNG, centre-cropped so the packed
/// image is a multiple of 32 on both sides.
pub fn read_visual_raw(path: &Path) -> Result<PlanarImage, LoadFailure> {
    let (width, height, mosaic) = read_mosaic(path)?;
    let window = centre_crop_window(width, height, VISUAL_MULTIPLE)
        .map_err(|e| LoadFailure::new(path, e))?;
    let cropped = crop(&mosaic, width, window);
    pack_bayer(&cropped, window.2, window.3).map_err(|e| LoadFailure::new(path, e))
}

fn read_mosaic(path: &Path) -> Result<(usize, usize, Vec<u16>), LoadFailure> {
    let img = image::open(path).map_err(|e| LoadFailure::new(path, e))?;
    let color = img.color();
    let DynamicImage::ImageLuma16(mono) = img else {
        return Err(LoadFailure::new(
            path,
            format!("expected a 16-bit single-channel mosaic, got {color:?}"),
        ));
    };
    let (w, h) = mono.dimensions();
    Ok((w as usize, h as usize, mono.into_raw()))
}

/// Read an RGB target, rescale by `scale` and convert to planar [0, 1].
pub fn read_target(path: &Path, scale: f64) -> Result<PlanarImage, LoadFailure> {
    let img = image::open(path).map_err(|e| LoadFailure::new(path, e))?;
    let rgb = img.into_rgb8();
    let (w, h) = rgb.dimensions();

    let rgb = if (scale - 1.0).abs() > f64::EPSILON {
        let new_w = ((w as f64 * scale).round() as u32).max(1);
        let new_h = ((h as f64 * scale).round() as u32).max(1);
        image::imageops::resize(&rgb, new_w, new_h, FilterType::CatmullRom)
    } else {
        rgb
    };

    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let area = width * height;
    let mut values = vec![0.0f32; 3 * area];
    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            values[c * area + i] = pixel[c] as f32 / 255.0;
        }
    }
    Ok(PlanarImage { channels: 3, height, width, values })
}
