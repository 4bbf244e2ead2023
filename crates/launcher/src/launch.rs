use std::ffi::OsString;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use speech_core::DeepSpeech;
use trainer::Trainer;

use crate::cli::TrainArgs;
use crate::config::RunConfig;

/// Seed fixed for every run.
pub const SEED: u64 = 234;

/// The collaborators a launch wires together.
pub trait Runtime {
    type Model;
    type Trainer;

    fn seed_everything(&mut self, seed: u64);

    fn init_model(&mut self, config: &RunConfig) -> Result<Self::Model>;

    fn init_trainer(&mut self, config: &RunConfig) -> Result<Self::Trainer>;

    /// Blocks until training stops.
    fn fit(&mut self, trainer: &mut Self::Trainer, model: &mut Self::Model) -> Result<()>;
}

/// Seeds, parses `args`, then builds the model and trainer and fits.
///
/// Parse failures, `--help` included, come back as a `clap::Error` inside the
/// returned error before any model is built.
pub fn run<R, I, T>(runtime: &mut R, args: I) -> Result<()>
where
    R: Runtime,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    runtime.seed_everything(SEED);

    let args = TrainArgs::try_parse_from(args)?;
    let config = RunConfig::from_args(args, SEED);
    info!(
        "Training on {:?} under {:?}: {} epochs, batch size {}, lr {}, \
         early stop on {} (patience {})",
        config.data_url,
        config.data_root,
        config.epochs,
        config.batch_size,
        config.learning_rate,
        config.early_stop_metric,
        config.early_stop_patience
    );

    let mut model = runtime
        .init_model(&config)
        .context("Failed to build the model")?;
    let mut trainer = runtime
        .init_trainer(&config)
        .context("Failed to build the trainer")?;

    runtime
        .fit(&mut trainer, &mut model)
        .context("Training failed")?;
    Ok(())
}

/// Runs DeepSpeech on the tch trainer.
#[derive(Debug, Default)]
pub struct DeepSpeechRuntime;

impl Runtime for DeepSpeechRuntime {
    type Model = DeepSpeech;
    type Trainer = Trainer;

    fn seed_everything(&mut self, seed: u64) {
        trainer::seed_everything(seed);
    }

    fn init_model(&mut self, config: &RunConfig) -> Result<DeepSpeech> {
        Ok(DeepSpeech::new(config.model_config())?)
    }

    fn init_trainer(&mut self, config: &RunConfig) -> Result<Trainer> {
        let trainer = Trainer::new(config.trainer_config())?
            .with_callback(Box::new(config.early_stop_callback.clone()));
        Ok(trainer)
    }

    fn fit(&mut self, trainer: &mut Trainer, model: &mut DeepSpeech) -> Result<()> {
        let summary = trainer.fit(model)?;
        info!(
            "Training complete: {} epoch(s), {} step(s){}, logs in {:?}",
            summary.epochs_completed,
            summary.global_step,
            if summary.stopped_early { ", stopped early" } else { "" },
            summary.log_dir
        );
        Ok(())
    }
}
