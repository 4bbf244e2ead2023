use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Monitored metric '{monitor}' not found, available metrics: {available:?}")]
    MissingMetric {
        monitor: String,
        available: Vec<String>,
    },

    #[error("Module error: {0}")]
    Module(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, TrainerError>;
