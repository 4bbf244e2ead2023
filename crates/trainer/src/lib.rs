pub mod callback;
pub mod device;
pub mod error;
pub mod module;
pub mod scaler;
pub mod seed;
pub mod train;

pub use callback::{Callback, CallbackAction, EarlyStopping, Mode};
pub use error::{Result, TrainerError};
pub use module::{Loader, Metrics, StepContext, TrainingModule, ValidationOutput};
pub use scaler::GradScaler;
pub use seed::seed_everything;
pub use train::{FitSummary, Trainer};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub max_epochs: usize,
    /// Number of batches whose gradients are summed before an optimizer step.
    pub accumulate_grad_batches: usize,
    /// Number of CUDA devices requested. Zero trains on the CPU.
    pub gpus: usize,
    /// Floating point width in bits: 16 (mixed), 32 or 64.
    pub precision: u32,
    /// Max gradient norm. Zero or negative disables clipping.
    pub gradient_clip_val: f64,
    pub auto_scale_batch_size: bool,
    pub auto_select_gpus: bool,
    pub log_gpu_memory: bool,
    /// Enables 16-bit autocast. With it off, `precision: 16` trains in 32 bit.
    pub use_amp: bool,
    pub default_root_dir: String,
    pub log_every_n_steps: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_epochs: 1000,
            accumulate_grad_batches: 1,
            gpus: 0,
            precision: 32,
            gradient_clip_val: 0.0,
            auto_scale_batch_size: false,
            auto_select_gpus: false,
            log_gpu_memory: false,
            use_amp: false,
            default_root_dir: "runs".to_string(),
            log_every_n_steps: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    /// fp32 weights with autocast in the forward pass and dynamic loss
    /// scaling. Needs `use_amp`, otherwise the trainer runs in `Single`.
    Mixed,
    Single,
    Double,
}

impl Precision {
    pub fn bits(self) -> u32 {
        match self {
            Precision::Mixed => 16,
            Precision::Single => 32,
            Precision::Double => 64,
        }
    }
}

impl TryFrom<u32> for Precision {
    type Error = TrainerError;

    fn try_from(bits: u32) -> Result<Self> {
        match bits {
            16 => Ok(Precision::Mixed),
            32 => Ok(Precision::Single),
            64 => Ok(Precision::Double),
            other => Err(TrainerError::Misconfiguration(format!(
                "precision must be 16, 32 or 64, got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_accepts_supported_widths() {
        assert_eq!(Precision::try_from(16).unwrap(), Precision::Mixed);
        assert_eq!(Precision::try_from(32).unwrap(), Precision::Single);
        assert_eq!(Precision::try_from(64).unwrap().bits(), 64);
    }

    #[test]
    fn precision_rejects_other_widths() {
        let err = Precision::try_from(8).unwrap_err();
        assert!(matches!(err, TrainerError::Misconfiguration(_)));
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let config = TrainerConfig {
            max_epochs: 3,
            gpus: 2,
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: TrainerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.max_epochs, 3);
        assert_eq!(back.gpus, 2);
        assert_eq!(back.default_root_dir, "runs");
    }
}
