pub mod cli;
pub mod config;
pub mod launch;

pub use cli::TrainArgs;
pub use config::RunConfig;
pub use launch::{run, DeepSpeechRuntime, Runtime, SEED};
