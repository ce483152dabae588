// ============================================================
// Layer 6 — Visual Exporter
// ============================================================
// Writes rendered model outputs as JPEG files:
//
//   results/pynet_img_<j>_level_<L>_epoch_<E>.jpg
//
// The same visual inputs are re-rendered every epoch so progress
// can be compared side by side.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::RgbImage;

use crate::domain::error::{TrainError, TrainResult};
use crate::domain::level::Level;
use crate::domain::rendered::RenderedImage;
use crate::domain::traits::{EpochSource, InferenceEngine};

pub struct VisualExporter {
    dir: PathBuf,
}

impl VisualExporter {
    pub fn new(dir: impl Into<PathBuf>) -> TrainResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| TrainError::io(format!("creating '{}'", dir.display()), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: usize, level: Level, epoch: usize) -> PathBuf {
        self.dir
            .join(format!("pynet_img_{index}_level_{level}_epoch_{epoch}.jpg"))
    }

    pub fn write(
        &self,
        index: usize,
        level: Level,
        epoch: usize,
        image: &RenderedImage,
    ) -> TrainResult<PathBuf> {
        let path = self.path_for(index, level, epoch);
        let action = || format!("writing visual '{}'", path.display());

        let buffer = RgbImage::from_raw(image.width, image.height, image.rgb.clone()).ok_or_else(|| {
            TrainError::compute(format!(
                "rendered buffer of {} bytes does not fit {}x{}",
                image.rgb.len(),
                image.width,
                image.height
            ))
        })?;
        buffer
            .save(&path)
            .map_err(|e| TrainError::io(action(), std::io::Error::other(e)))?;

        tracing::debug!("Wrote visual '{}'", path.display());
        Ok(path)
    }

    /// Render every visual input with `engine` and write one file each.
    /// Returns the number of files written.
    pub fn export<I, V>(&self, engine: &I, source: &V, level: Level, epoch: usize) -> TrainResult<usize>
    where
        I: InferenceEngine,
        V: EpochSource<Item = TrainResult<I::Raw>>,
    {
        let mut raws = source.epoch();
        for j in 0..source.num_batches() {
            let raw = raws.next().ok_or_else(|| {
                TrainError::compute(format!(
                    "visual source ended after {j} of {} inputs",
                    source.num_batches()
                ))
            })??;
            let image = engine.render(raw)?;
            self.write(j, level, epoch, &image)?;
        }
        Ok(source.num_batches())
    }
}
