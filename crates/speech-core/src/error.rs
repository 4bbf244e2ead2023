use thiserror::Error;
use trainer::TrainerError;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Manifest {path}:{line}: {reason}")]
    Manifest {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Character not in vocabulary: {0:?}")]
    UnknownChar(char),

    #[error("Bad feature tensor {path}: {reason}")]
    BadFeatures { path: String, reason: String },

    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
}

impl From<SpeechError> for TrainerError {
    fn from(e: SpeechError) -> Self {
        TrainerError::Module(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;
