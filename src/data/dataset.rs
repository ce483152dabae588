use std::path::PathBuf;

use burn::data::dataset::Dataset;

use crate::data::bayer::PlanarImage;
use crate::data::loader::{read_raw, read_target, read_visual_raw, DatasetLayout, LoadFailure, Split};

/// One aligned (packed RAW, RGB target) sample.
#[derive(Debug, Clone)]
pub struct PairItem {
    pub source: PathBuf,
    pub input:  PlanarImage,
    pub target: PlanarImage,
}

/// One full-resolution visual input.
#[derive(Debug, Clone)]
pub struct VisualItem {
    pub source: PathBuf,
    pub raw:    PlanarImage,
}

/// Indexed RAW/RGB pairs, decoded lazily on `get`.
pub struct PairedImageDataset {
    layout:       DatasetLayout,
    split:        Split,
    len:          usize,
    target_scale: f64,
}

impl PairedImageDataset {
    pub fn new(layout: DatasetLayout, split: Split, len: usize, target_scale: f64) -> Self {
        Self { layout, split, len, target_scale }
    }
}

impl Dataset<Result<PairItem, LoadFailure>> for PairedImageDataset {
    fn get(&self, index: usize) -> Option<Result<PairItem, LoadFailure>> {
        if index >= self.len {
            return None;
        }
        let raw_path = self.layout.raw_path(self.split, index);
        let target_path = self.layout.target_path(self.split, index);
        Some(read_raw(&raw_path).and_then(|input| {
            let target = read_target(&target_path, self.target_scale)?;
            Ok(PairItem { source: raw_path, input, target })
        }))
    }

    fn len(&self) -> usize {
        self.len
    }
}

pub struct VisualDataset {
    paths: Vec<PathBuf>,
}

impl VisualDataset {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl Dataset<Result<VisualItem, LoadFailure>> for VisualDataset {
    fn get(&self, index: usize) -> Option<Result<VisualItem, LoadFailure>> {
        let path = self.paths.get(index)?;
        Some(read_visual_raw(path).map(|raw| VisualItem { source: path.clone(), raw }))
    }

    fn len(&self) -> usize {
        self.paths.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::tests::write_dataset;

    #[test]
    fn test_pair_dataset_yields_aligned_items() {
        let dir = write_dataset(2, 0, 32, 0);
        let layout = DatasetLayout::open(dir.path()).unwrap();
        let ds = PairedImageDataset::new(layout, Split::Train, 2, 0.5);

        assert_eq!(ds.len(), 2);
        let item = ds.get(1).unwrap().unwrap();
        assert_eq!(item.input.dims(), [4, 16, 16]);
        assert_eq!(item.target.dims(), [3, 16, 16]);
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_missing_file_is_reported_not_panicked() {
        let dir = write_dataset(1, 0, 32, 0);
        let layout = DatasetLayout::open(dir.path()).unwrap();
        // claims more samples than exist on disk
        let ds = PairedImageDataset::new(layout, Split::Train, 3, 1.0);
        assert!(ds.get(2).unwrap().is_err());
    }

    #[test]
    fn test_visual_dataset() {
        let dir = write_dataset(0, 0, 8, 2);
        let layout = DatasetLayout::open(dir.path()).unwrap();
        let ds = VisualDataset::new(layout.visual_paths(10).unwrap());
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0).unwrap().unwrap().raw.dims(), [4, 32, 32]);
    }
}
