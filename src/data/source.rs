// ============================================================
// Layer 4 — Epoch Sources
// ============================================================
// Wraps Burn DataLoaders as EpochSource values:
//
//   training  shuffled, fixed batch size, the incomplete final
//             batch is never requested (num_batches = len / batch)
//   held-out  in order, batch size 1, every sample
//   visuals   in order, batch size 1, loaded on the calling thread
//
// The training and held-out loaders decode on one background worker
// each.

use std::sync::Arc;

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    prelude::*,
};

use crate::data::batcher::{PairBatcher, VisualBatcher};
use crate::data::dataset::{PairedImageDataset, VisualDataset};
use crate::data::loader::LoadFailure;
use crate::domain::error::{TrainError, TrainResult};
use crate::domain::traits::{EpochSource, TrainPair};

pub struct LoaderSource<T> {
    loader:      Arc<dyn DataLoader<Result<T, LoadFailure>>>,
    num_batches: usize,
}

impl<T> EpochSource for LoaderSource<T> {
    type Item = TrainResult<T>;

    fn num_batches(&self) -> usize {
        self.num_batches
    }

    fn epoch(&self) -> Box<dyn Iterator<Item = TrainResult<T>> + '_> {
        Box::new(self.loader.iter().map(|batch| batch.map_err(TrainError::from)))
    }
}

pub fn training_source<B: Backend>(
    dataset:    PairedImageDataset,
    batch_size: usize,
    seed:       u64,
    device:     B::Device,
) -> TrainResult<LoaderSource<TrainPair<Tensor<B, 4>>>> {
    if batch_size == 0 {
        return Err(TrainError::config("batch size must be positive"));
    }
    let num_batches = dataset.len() / batch_size;
    if num_batches == 0 {
        return Err(TrainError::config(format!(
            "training set of {} samples is smaller than one batch of {batch_size}",
            dataset.len()
        )));
    }

    let loader = DataLoaderBuilder::new(PairBatcher::<B>::new(device))
        .batch_size(batch_size)
        .shuffle(seed)
        .num_workers(1)
        .build(dataset);

    Ok(LoaderSource { loader, num_batches })
}

pub fn held_out_source<B: Backend>(
    dataset: PairedImageDataset,
    device:  B::Device,
) -> TrainResult<LoaderSource<TrainPair<Tensor<B, 4>>>> {
    let num_batches = dataset.len();
    if num_batches == 0 {
        return Err(TrainError::config("held-out set is empty"));
    }

    let loader = DataLoaderBuilder::new(PairBatcher::<B>::new(device))
        .batch_size(1)
        .num_workers(1)
        .build(dataset);

    Ok(LoaderSource { loader, num_batches })
}

pub fn visual_source<B: Backend>(
    dataset: VisualDataset,
    device:  B::Device,
) -> LoaderSource<Tensor<B, 4>> {
    let num_batches = dataset.len();
    let loader = DataLoaderBuilder::new(VisualBatcher::<B>::new(device))
        .batch_size(1)
        .build(dataset);

    LoaderSource { loader, num_batches }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::tests::write_dataset;
    use crate::data::loader::{DatasetLayout, Split};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_training_source_drops_incomplete_batch() {
        let dir = write_dataset(5, 0, 32, 0);
        let layout = DatasetLayout::open(dir.path()).unwrap();
        let ds = PairedImageDataset::new(layout, Split::Train, 5, 1.0);
        let source = training_source::<TestBackend>(ds, 2, 0, Default::default()).unwrap();

        assert_eq!(source.num_batches(), 2);
        let batch = source.epoch().next().unwrap().unwrap();
        assert_eq!(batch.input.dims(), [2, 4, 16, 16]);
        assert_eq!(batch.target.dims(), [2, 3, 32, 32]);
    }

    #[test]
    fn test_training_source_rejects_tiny_set() {
        let dir = write_dataset(1, 0, 32, 0);
        let layout = DatasetLayout::open(dir.path()).unwrap();
        let ds = PairedImageDataset::new(layout, Split::Train, 1, 1.0);
        let err = training_source::<TestBackend>(ds, 2, 0, Default::default()).err().unwrap();
        assert!(matches!(err, TrainError::Configuration(_)));
    }

    #[test]
    fn test_held_out_source_keeps_every_sample() {
        let dir = write_dataset(0, 3, 32, 0);
        let layout = DatasetLayout::open(dir.path()).unwrap();
        let ds = PairedImageDataset::new(layout, Split::Test, 3, 1.0);
        let source = held_out_source::<TestBackend>(ds, Default::default()).unwrap();

        assert_eq!(source.num_batches(), 3);
        assert_eq!(source.epoch().filter(|b| b.is_ok()).count(), 3);
    }

    #[test]
    fn test_load_errors_become_compute_errors() {
        let dir = write_dataset(0, 1, 32, 0);
        let layout = DatasetLayout::open(dir.path()).unwrap();
        let ds = PairedImageDataset::new(layout, Split::Test, 2, 1.0);
        let source = held_out_source::<TestBackend>(ds, Default::default()).unwrap();

        let results: Vec<_> = source.epoch().collect();
        assert!(results.iter().any(|r| matches!(r, Err(TrainError::Compute(_)))));
    }

    #[test]
    fn test_off_size_pair_is_compute_error() {
        // 80x80 raw packs to 40x40
        let dir = write_dataset(0, 1, 80, 0);
        let layout = DatasetLayout::open(dir.path()).unwrap();
        let ds = PairedImageDataset::new(layout, Split::Test, 1, 1.0);
        let source = held_out_source::<TestBackend>(ds, Default::default()).unwrap();

        let first = source.epoch().next().unwrap();
        assert!(matches!(first, Err(TrainError::Compute(_))));
    }

    #[test]
    fn test_visual_source() {
        let dir = write_dataset(0, 0, 8, 2);
        let layout = DatasetLayout::open(dir.path()).unwrap();
        let ds = VisualDataset::new(layout.visual_paths(2).unwrap());
        let source = visual_source::<TestBackend>(ds, Default::default());
        assert_eq!(source.num_batches(), 2);
        assert_eq!(source.epoch().count(), 2);
    }
}
