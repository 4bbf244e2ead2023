use std::path::PathBuf;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpeechError};
use crate::text::BLANK;

/// Model-specific command line options, flattened into the launcher's parser.
#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepSpeechArgs {
    /// Residual CNN blocks after the convolution stem.
    #[arg(long = "n_cnn_layers", default_value_t = 3)]
    pub n_cnn_layers: i64,

    /// Bidirectional GRU blocks.
    #[arg(long = "n_rnn_layers", default_value_t = 5)]
    pub n_rnn_layers: i64,

    /// Hidden size of each GRU direction.
    #[arg(long = "rnn_dim", default_value_t = 512)]
    pub rnn_dim: i64,

    /// Output classes, including the CTC blank.
    #[arg(long = "n_class", default_value_t = 29)]
    pub n_class: i64,

    /// Mel bins per spectrogram frame.
    #[arg(long = "n_feats", default_value_t = 128)]
    pub n_feats: i64,

    /// Stride of the convolution stem over both axes.
    #[arg(long = "stride", default_value_t = 2)]
    pub stride: i64,

    #[arg(long = "dropout", default_value_t = 0.1)]
    pub dropout: f64,

    /// Split under the data root used for validation.
    #[arg(long = "val_url", default_value = "test-clean")]
    pub val_url: String,
}

impl Default for DeepSpeechArgs {
    fn default() -> Self {
        Self {
            n_cnn_layers: 3,
            n_rnn_layers: 5,
            rnn_dim: 512,
            n_class: 29,
            n_feats: 128,
            stride: 2,
            dropout: 0.1,
            val_url: "test-clean".to_string(),
        }
    }
}

impl DeepSpeechArgs {
    /// Feature rows left after the stem: ceil(n_feats / stride).
    pub fn conv_feats(&self) -> i64 {
        (self.n_feats + self.stride - 1) / self.stride
    }
}

/// Everything `DeepSpeech::new` needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSpeechConfig {
    #[serde(flatten)]
    pub model: DeepSpeechArgs,
    pub batch_size: usize,
    pub num_workers: usize,
    pub learning_rate: f64,
    pub data_root: PathBuf,
    pub data_url: Vec<String>,
    pub seed: u64,
}

impl Default for DeepSpeechConfig {
    fn default() -> Self {
        Self {
            model: DeepSpeechArgs::default(),
            batch_size: 8,
            num_workers: 4,
            learning_rate: 1e-3,
            data_root: PathBuf::from("data/"),
            data_url: vec![
                "train-clean-100".to_string(),
                "train-clean-360".to_string(),
                "train-other-500".to_string(),
            ],
            seed: 0,
        }
    }
}

impl DeepSpeechConfig {
    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        let invalid = |reason: String| Err(SpeechError::InvalidConfig(reason));

        if m.n_class <= BLANK {
            return invalid(format!(
                "n_class must be greater than the blank id {}, got {}",
                BLANK, m.n_class
            ));
        }
        if m.stride < 1 {
            return invalid(format!("stride must be positive, got {}", m.stride));
        }
        if m.n_feats < 1 || m.rnn_dim < 1 {
            return invalid(format!(
                "n_feats and rnn_dim must be positive, got {} and {}",
                m.n_feats, m.rnn_dim
            ));
        }
        if m.n_cnn_layers < 0 || m.n_rnn_layers < 1 {
            return invalid(format!(
                "need at least one GRU block and no negative CNN count, got {} CNN / {} RNN",
                m.n_cnn_layers, m.n_rnn_layers
            ));
        }
        if !(0.0..1.0).contains(&m.dropout) {
            return invalid(format!("dropout must be in [0, 1), got {}", m.dropout));
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".to_string());
        }
        if self.learning_rate <= 0.0 {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if self.data_url.is_empty() {
            return invalid("data_url names no training split".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        DeepSpeechConfig::default().validate().unwrap();
    }

    #[test]
    fn conv_feats_rounds_up() {
        let args = DeepSpeechArgs {
            n_feats: 81,
            ..Default::default()
        };
        assert_eq!(args.conv_feats(), 41);
        assert_eq!(DeepSpeechArgs::default().conv_feats(), 64);
    }

    #[test]
    fn too_few_classes_is_rejected() {
        let config = DeepSpeechConfig {
            model: DeepSpeechArgs {
                n_class: 28,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SpeechError::InvalidConfig(_))));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = DeepSpeechConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn hparams_serialize_flat() {
        let yaml = serde_yaml::to_string(&DeepSpeechConfig::default()).unwrap();
        assert!(yaml.contains("rnn_dim: 512"));
        assert!(yaml.contains("batch_size: 8"));
    }
}
