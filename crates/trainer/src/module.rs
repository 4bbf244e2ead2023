use std::collections::BTreeMap;

use tch::{nn, Device, Kind, Tensor};

use crate::error::Result;

/// Named scalar metrics, ordered by name.
pub type Metrics = BTreeMap<String, f64>;

/// Owned batch stream handed out by a module for one pass over its data.
pub type Loader<B> = Box<dyn Iterator<Item = Result<B>>>;

/// Where and in which dtype a step runs.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub device: Device,
    pub kind: Kind,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationOutput {
    pub metrics: Metrics,
    /// Weight of this batch in the epoch average, usually its size.
    pub weight: f64,
}

/// A model together with its data and optimizer setup, driven by `Trainer::fit`.
pub trait TrainingModule {
    type Batch;

    fn var_store(&self) -> &nn::VarStore;

    fn var_store_mut(&mut self) -> &mut nn::VarStore;

    fn configure_optimizer(&self) -> Result<nn::Optimizer>;

    /// Training batches for `epoch`. Modules shuffle here.
    fn train_dataloader(&self, epoch: usize) -> Result<Loader<Self::Batch>>;

    fn val_dataloader(&self) -> Result<Loader<Self::Batch>>;

    /// Returns the scalar loss to backpropagate.
    fn training_step(&mut self, batch: &Self::Batch, ctx: &StepContext) -> Result<Tensor>;

    fn validation_step(&mut self, batch: &Self::Batch, ctx: &StepContext)
        -> Result<ValidationOutput>;

    fn hparams(&self) -> Result<serde_yaml::Value> {
        Ok(serde_yaml::Value::Mapping(Default::default()))
    }
}
