use std::path::PathBuf;

use clap::{ArgAction, Parser};
use speech_core::DeepSpeechArgs;

/// Command line of `deepspeech-train`. Long flags keep their snake_case names.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "deepspeech-train",
    version,
    about = "Train a DeepSpeech speech recognition model"
)]
pub struct TrainArgs {
    #[command(flatten)]
    pub model: DeepSpeechArgs,

    /// Threads loading feature files.
    #[arg(long = "num_workers", default_value_t = 4)]
    pub num_workers: usize,

    #[arg(long = "batch_size", default_value_t = 8)]
    pub batch_size: usize,

    /// Directory holding one sub-directory per split.
    #[arg(long = "data_root", default_value = "data/")]
    pub data_root: PathBuf,

    /// Training splits under the data root, in order.
    #[arg(
        long = "data_url",
        num_args = 1..,
        default_values = ["train-clean-100", "train-clean-360", "train-other-500"]
    )]
    pub data_url: Vec<String>,

    #[arg(long = "epochs", default_value_t = 20)]
    pub epochs: usize,

    #[arg(long = "learning_rate", default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Replaced by 40 after parsing.
    #[arg(long = "accumulate_grad_batches", default_value_t = 40)]
    pub accumulate_grad_batches: usize,

    #[arg(long = "gpus", default_value_t = 1)]
    pub gpus: usize,

    /// 16, 32 or 64.
    #[arg(long = "precision", default_value_t = 16)]
    pub precision: u32,

    /// Max gradient norm, 0 disables clipping.
    #[arg(long = "gradient_clip", default_value_t = 0.5)]
    pub gradient_clip: f64,

    #[arg(long = "auto_scale_batch_size", default_value_t = true, action = ArgAction::Set)]
    pub auto_scale_batch_size: bool,

    #[arg(long = "auto_select_gpus", default_value_t = true, action = ArgAction::Set)]
    pub auto_select_gpus: bool,

    #[arg(long = "log_gpu_memory", default_value_t = true, action = ArgAction::Set)]
    pub log_gpu_memory: bool,

    #[arg(long = "use_amp", default_value_t = true, action = ArgAction::Set)]
    pub use_amp: bool,

    /// Validation metric watched by early stopping.
    #[arg(long = "early_stop_metric", default_value = "wer")]
    pub early_stop_metric: String,

    #[arg(long = "early_stop_patience", default_value_t = 3)]
    pub early_stop_patience: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        TrainArgs::command().debug_assert();
    }
}
