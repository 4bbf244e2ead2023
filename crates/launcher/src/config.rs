use std::path::PathBuf;

use log::warn;
use speech_core::{DeepSpeechArgs, DeepSpeechConfig};
use trainer::{EarlyStopping, TrainerConfig};

use crate::cli::TrainArgs;

/// Gradient accumulation every run uses, whatever the command line said.
pub const ACCUMULATE_GRAD_BATCHES: usize = 40;

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub model: DeepSpeechArgs,
    pub num_workers: usize,
    pub batch_size: usize,
    pub data_root: PathBuf,
    pub data_url: Vec<String>,
    pub epochs: usize,
    pub learning_rate: f64,
    pub accumulate_grad_batches: usize,
    pub gpus: usize,
    pub precision: u32,
    pub gradient_clip: f64,
    pub auto_scale_batch_size: bool,
    pub auto_select_gpus: bool,
    pub log_gpu_memory: bool,
    pub use_amp: bool,
    pub early_stop_metric: String,
    pub early_stop_patience: usize,
    pub early_stop_callback: EarlyStopping,
    pub seed: u64,
    /// Parent of the `version_N` log directories.
    pub default_root_dir: String,
}

impl RunConfig {
    pub fn from_args(args: TrainArgs, seed: u64) -> Self {
        let early_stop_callback =
            EarlyStopping::new(args.early_stop_metric.clone(), args.early_stop_patience)
                .verbose(true);

        if args.accumulate_grad_batches != ACCUMULATE_GRAD_BATCHES {
            warn!(
                "--accumulate_grad_batches {} ignored, using {}",
                args.accumulate_grad_batches, ACCUMULATE_GRAD_BATCHES
            );
        }

        Self {
            model: args.model,
            num_workers: args.num_workers,
            batch_size: args.batch_size,
            data_root: args.data_root,
            data_url: args.data_url,
            epochs: args.epochs,
            learning_rate: args.learning_rate,
            accumulate_grad_batches: ACCUMULATE_GRAD_BATCHES,
            gpus: args.gpus,
            precision: args.precision,
            gradient_clip: args.gradient_clip,
            auto_scale_batch_size: args.auto_scale_batch_size,
            auto_select_gpus: args.auto_select_gpus,
            log_gpu_memory: args.log_gpu_memory,
            use_amp: args.use_amp,
            early_stop_metric: args.early_stop_metric,
            early_stop_patience: args.early_stop_patience,
            early_stop_callback,
            seed,
            default_root_dir: TrainerConfig::default().default_root_dir,
        }
    }

    pub fn model_config(&self) -> DeepSpeechConfig {
        DeepSpeechConfig {
            model: self.model.clone(),
            batch_size: self.batch_size,
            num_workers: self.num_workers,
            learning_rate: self.learning_rate,
            data_root: self.data_root.clone(),
            data_url: self.data_url.clone(),
            seed: self.seed,
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            max_epochs: self.epochs,
            accumulate_grad_batches: self.accumulate_grad_batches,
            gpus: self.gpus,
            precision: self.precision,
            gradient_clip_val: self.gradient_clip,
            auto_scale_batch_size: self.auto_scale_batch_size,
            auto_select_gpus: self.auto_select_gpus,
            log_gpu_memory: self.log_gpu_memory,
            use_amp: self.use_amp,
            default_root_dir: self.default_root_dir.clone(),
            ..Default::default()
        }
    }
}
