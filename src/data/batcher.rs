// ============================================================
// Layer 4 — Image Batchers
// ============================================================
// Implements Burn's Batcher trait to stack planar images into
// [N, C, H, W] tensors on the target device.
//
// A batch fails as a whole if any item failed to load or if item
// sizes disagree; the failure travels through the DataLoader as a
// value and surfaces in the training loop as a compute error.
//
// Reference: Burn Book §4 (Batcher)

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::bayer::PlanarImage;
use crate::data::dataset::{PairItem, VisualItem};
use crate::data::loader::LoadFailure;
use crate::domain::traits::TrainPair;

/// Stack same-sized planar images; `sources` names each item for errors.
fn stack<B: Backend>(
    images:  &[&PlanarImage],
    sources: &[&std::path::Path],
    device:  &B::Device,
) -> Result<Tensor<B, 4>, LoadFailure> {
    let first = images
        .first()
        .ok_or_else(|| LoadFailure::new(std::path::Path::new("<batch>"), "empty batch"))?;
    let [c, h, w] = first.dims();

    let mut flat = Vec::with_capacity(images.len() * c * h * w);
    for (image, source) in images.iter().zip(sources) {
        if image.dims() != [c, h, w] {
            return Err(LoadFailure::new(
                source,
                format!("size {:?} does not match batch size {:?}", image.dims(), [c, h, w]),
            ));
        }
        flat.extend_from_slice(&image.values);
    }

    Ok(Tensor::from_data(TensorData::new(flat, [images.len(), c, h, w]), device))
}

// ─── PairBatcher ──────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct PairBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> PairBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<Result<PairItem, LoadFailure>, Result<TrainPair<Tensor<B, 4>>, LoadFailure>>
    for PairBatcher<B>
{
    fn batch(&self, items: Vec<Result<PairItem, LoadFailure>>) -> Result<TrainPair<Tensor<B, 4>>, LoadFailure> {
        let items = items.into_iter().collect::<Result<Vec<_>, _>>()?;

        let sources: Vec<_> = items.iter().map(|i| i.source.as_path()).collect();
        let inputs: Vec<_> = items.iter().map(|i| &i.input).collect();
        let targets: Vec<_> = items.iter().map(|i| &i.target).collect();

        Ok(TrainPair {
            input:  stack(&inputs, &sources, &self.device)?,
            target: stack(&targets, &sources, &self.device)?,
        })
    }
}

// ─── VisualBatcher ────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct VisualBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> VisualBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<Result<VisualItem, LoadFailure>, Result<Tensor<B, 4>, LoadFailure>>
    for VisualBatcher<B>
{
    fn batch(&self, items: Vec<Result<VisualItem, LoadFailure>>) -> Result<Tensor<B, 4>, LoadFailure> {
        let items = items.into_iter().collect::<Result<Vec<_>, _>>()?;
        let sources: Vec<_> = items.iter().map(|i| i.source.as_path()).collect();
        let raws: Vec<_> = items.iter().map(|i| &i.raw).collect();
        stack(&raws, &sources, &self.device)
    }
}
