pub mod config;
pub mod dataset;
pub mod decoder;
pub mod deepspeech;
pub mod error;
pub mod layer_norm;
pub mod metrics;
pub mod module;
pub mod text;

pub use config::{DeepSpeechArgs, DeepSpeechConfig};
pub use dataset::{SpeechBatch, SpeechDataset, Utterance};
pub use deepspeech::DeepSpeechNet;
pub use error::SpeechError;
pub use module::DeepSpeech;
pub use text::{TextTransform, BLANK};
