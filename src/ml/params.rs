// ============================================================
// Layer 5 — Named Parameter Walk
// ============================================================
// Moves parameters between Burn modules and a TrainableState.
//
// Every module that owns weights implements NamedParams and
// passes a dotted prefix down to its children, so a stage's head
// conv ends up under "decoder.3.head.weight". The same walk runs
// in both directions: export copies values out, import swaps in
// whatever the Restorer hands back and keeps the rest.

use burn::{
    module::Param,
    nn::conv::{Conv2d, ConvTranspose2d},
    prelude::*,
};

use crate::domain::error::{TrainError, TrainResult};
use crate::domain::state::{ParamTensor, Restorer, TrainableState};

pub trait NamedParams: Sized {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()>;

    fn import(self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self>;
}

pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

pub fn export_param<B: Backend, const D: usize>(
    name:  String,
    param: &Param<Tensor<B, D>>,
    state: &mut TrainableState,
) -> TrainResult<()> {
    let tensor = param.val();
    let shape  = tensor.dims().to_vec();
    let values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| TrainError::compute(format!("cannot read parameter {name}: {e:?}")))?;
    state.insert(name, ParamTensor::new(shape, values)?);
    Ok(())
}

pub fn import_param<B: Backend, const D: usize>(
    name:     &str,
    param:    Param<Tensor<B, D>>,
    restorer: &mut Restorer<'_>,
) -> Param<Tensor<B, D>> {
    let current = param.val();
    let dims    = current.dims();
    match restorer.take(name, &dims) {
        Some(saved) => {
            let device = current.device();
            let data   = TensorData::new(saved.values.clone(), dims);
            Param::from_tensor(Tensor::from_data(data, &device))
        }
        None => param,
    }
}

impl<B: Backend> NamedParams for Conv2d<B> {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()> {
        export_param(join(prefix, "weight"), &self.weight, state)?;
        if let Some(bias) = &self.bias {
            export_param(join(prefix, "bias"), bias, state)?;
        }
        Ok(())
    }

    fn import(mut self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self> {
        self.weight = import_param(&join(prefix, "weight"), self.weight, restorer);
        self.bias = self.bias.map(|b| import_param(&join(prefix, "bias"), b, restorer));
        Ok(self)
    }
}

impl<B: Backend> NamedParams for ConvTranspose2d<B> {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()> {
        export_param(join(prefix, "weight"), &self.weight, state)?;
        if let Some(bias) = &self.bias {
            export_param(join(prefix, "bias"), bias, state)?;
        }
        Ok(())
    }

    fn import(mut self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self> {
        self.weight = import_param(&join(prefix, "weight"), self.weight, restorer);
        self.bias = self.bias.map(|b| import_param(&join(prefix, "bias"), b, restorer));
        Ok(self)
    }
}

impl<M: NamedParams> NamedParams for Option<M> {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()> {
        match self {
            Some(inner) => inner.export(prefix, state),
            None => Ok(()),
        }
    }

    fn import(self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self> {
        self.map(|inner| inner.import(prefix, restorer)).transpose()
    }
}

/// Lists are numbered by position: "encoder.0", "encoder.1", ...
impl<M: NamedParams> NamedParams for Vec<M> {
    fn export(&self, prefix: &str, state: &mut TrainableState) -> TrainResult<()> {
        for (i, item) in self.iter().enumerate() {
            item.export(&join(prefix, &i.to_string()), state)?;
        }
        Ok(())
    }

    fn import(self, prefix: &str, restorer: &mut Restorer<'_>) -> TrainResult<Self> {
        self.into_iter()
            .enumerate()
            .map(|(i, item)| item.import(&join(prefix, &i.to_string()), restorer))
            .collect()
    }
}

/// Snapshot a whole module tree.
pub fn snapshot<M: NamedParams>(module: &M) -> TrainResult<TrainableState> {
    let mut state = TrainableState::new();
    module.export("", &mut state)?;
    Ok(state)
}

/// Non-strict restore of a whole module tree.
pub fn restore<M: NamedParams>(
    module: M,
    state:  &TrainableState,
) -> TrainResult<(M, crate::domain::state::LoadReport)> {
    let mut restorer = Restorer::new(state);
    let module = module.import("", &mut restorer)?;
    Ok((module, restorer.finish()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::conv::Conv2dConfig;

    type TestBackend = NdArray;

    #[test]
    fn test_join() {
        assert_eq!(join("", "weight"), "weight");
        assert_eq!(join("encoder.0", "conv_a"), "encoder.0.conv_a");
    }

    #[test]
    fn test_conv_export_names_and_shapes() {
        let device = Default::default();
        let conv: Conv2d<TestBackend> = Conv2dConfig::new([4, 8], [3, 3]).init(&device);
        let mut state = TrainableState::new();
        conv.export("head", &mut state).unwrap();

        assert_eq!(state.get("head.weight").unwrap().shape, vec![8, 4, 3, 3]);
        assert_eq!(state.get("head.bias").unwrap().shape, vec![8]);
    }

    #[test]
    fn test_conv_round_trip_copies_values() {
        let device = Default::default();
        let a: Conv2d<TestBackend> = Conv2dConfig::new([2, 3], [3, 3]).init(&device);
        let b: Conv2d<TestBackend> = Conv2dConfig::new([2, 3], [3, 3]).init(&device);

        let saved = snapshot(&a).unwrap();
        let (b, report) = restore(b, &saved).unwrap();

        assert!(report.is_exact());
        assert_eq!(snapshot(&b).unwrap(), saved);
    }

    #[test]
    fn test_vec_numbering() {
        let device = Default::default();
        let convs: Vec<Conv2d<TestBackend>> = (0..2)
            .map(|_| Conv2dConfig::new([1, 1], [1, 1]).init(&device))
            .collect();
        let state = snapshot(&convs).unwrap();
        let names: Vec<&str> = state.names().collect();
        assert_eq!(names, vec!["0.bias", "0.weight", "1.bias", "1.weight"]);
    }
}
