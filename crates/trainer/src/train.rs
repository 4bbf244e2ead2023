use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use tch::{nn, Device, Kind};

use crate::callback::{Callback, CallbackAction};
use crate::device::{gpu_memory_map, select_devices};
use crate::error::{Result, TrainerError};
use crate::module::{Metrics, StepContext, TrainingModule};
use crate::scaler::GradScaler;
use crate::{Precision, TrainerConfig};

/// What a finished `fit` call did.
#[derive(Debug, Clone, Default)]
pub struct FitSummary {
    pub epochs_completed: usize,
    /// Optimizer steps taken.
    pub global_step: usize,
    pub stopped_early: bool,
    /// Metrics of the last completed epoch.
    pub metrics: Metrics,
    pub log_dir: PathBuf,
}

pub struct Trainer {
    config: TrainerConfig,
    precision: Precision,
    callbacks: Vec<Box<dyn Callback>>,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Result<Self> {
        let mut precision = Precision::try_from(config.precision)?;
        if config.accumulate_grad_batches == 0 {
            return Err(TrainerError::Misconfiguration(
                "accumulate_grad_batches must be at least 1".to_string(),
            ));
        }
        if precision == Precision::Mixed && !config.use_amp {
            info!("use_amp is off, training in 32 bit instead of 16");
            precision = Precision::Single;
        }
        if config.auto_scale_batch_size {
            warn!(
                "auto_scale_batch_size is not supported, \
                 training with the module's configured batch size"
            );
        }

        Ok(Self {
            config,
            precision,
            callbacks: Vec::new(),
        })
    }

    pub fn with_callback(mut self, callback: Box<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Runs the full training loop, blocking until max_epochs is reached or a
    /// callback asks to stop.
    pub fn fit<M: TrainingModule>(&mut self, model: &mut M) -> Result<FitSummary> {
        let devices = select_devices(self.config.gpus, self.config.auto_select_gpus)?;
        let device = devices[0];
        if devices.len() > 1 {
            warn!(
                "{} devices selected, training runs on {:?} only",
                devices.len(),
                device
            );
        }

        let precision = effective_precision(self.precision, device);
        let kind = match precision {
            Precision::Double => Kind::Double,
            _ => Kind::Float,
        };
        info!("Using device: {:?}, precision: {} bit", device, precision.bits());

        {
            let vs = model.var_store_mut();
            vs.set_device(device);
            if precision == Precision::Double {
                vs.double();
            }
        }
        let mut optimizer = model.configure_optimizer()?;

        let log_dir = next_version_dir(Path::new(&self.config.default_root_dir))?;
        fs::create_dir_all(&log_dir)?;
        let hparams = serde_yaml::to_string(&model.hparams()?)?;
        fs::write(log_dir.join("hparams.yaml"), hparams)?;
        info!("Logging to {:?}", log_dir);

        for callback in self.callbacks.iter_mut() {
            callback.on_fit_start(&self.config)?;
        }

        let ctx = StepContext { device, kind };
        let autocast = precision == Precision::Mixed;
        let mut scaler = autocast.then(GradScaler::default);
        let accumulate = self.config.accumulate_grad_batches;
        let mut summary = FitSummary {
            log_dir,
            ..Default::default()
        };

        for epoch in 0..self.config.max_epochs {
            let mut epoch_loss = 0.0;
            let mut num_batches = 0usize;

            optimizer.zero_grad();
            for batch in model.train_dataloader(epoch)? {
                let batch = batch?;
                let loss = tch::autocast(autocast, || model.training_step(&batch, &ctx))?;
                let loss_val = loss.double_value(&[]);
                let loss = match &scaler {
                    Some(scaler) => scaler.scale_loss(&loss),
                    None => loss,
                };
                (&loss / accumulate as f64).backward();

                num_batches += 1;
                epoch_loss += loss_val;

                if num_batches % accumulate == 0 {
                    self.optimizer_step(&mut optimizer, model.var_store(), scaler.as_mut());
                    summary.global_step += 1;
                }

                if self.config.log_every_n_steps > 0
                    && num_batches % self.config.log_every_n_steps == 0
                {
                    info!("Epoch {} | Batch {} | Loss: {:.4}", epoch, num_batches, loss_val);
                }
            }

            if num_batches % accumulate != 0 {
                self.optimizer_step(&mut optimizer, model.var_store(), scaler.as_mut());
                summary.global_step += 1;
            }
            if num_batches == 0 {
                warn!("Epoch {}: training dataloader produced no batches", epoch);
            }

            let mut metrics = validate(model, &ctx, autocast)?;
            if num_batches > 0 {
                metrics.insert("train_loss".to_string(), epoch_loss / num_batches as f64);
            }
            info!("Epoch {} | {}", epoch, format_metrics(&metrics));

            if self.config.log_gpu_memory && device.is_cuda() {
                match gpu_memory_map() {
                    Ok(memory) => info!("GPU memory used (MiB): {:?}", memory),
                    Err(e) => warn!("Could not query GPU memory: {}", e),
                }
            }

            summary.epochs_completed = epoch + 1;
            summary.metrics = metrics;

            let mut stop = false;
            for callback in self.callbacks.iter_mut() {
                if callback.on_validation_end(epoch, &summary.metrics)? == CallbackAction::Stop {
                    stop = true;
                }
            }
            if stop {
                summary.stopped_early = true;
                break;
            }
        }

        info!(
            "Fit finished after {} epoch(s), {} optimizer step(s)",
            summary.epochs_completed, summary.global_step
        );
        Ok(summary)
    }

    /// Unscales, clips and steps. A step with non-finite scaled gradients is
    /// skipped.
    fn optimizer_step(
        &self,
        optimizer: &mut nn::Optimizer,
        vs: &nn::VarStore,
        scaler: Option<&mut GradScaler>,
    ) {
        if let Some(scaler) = scaler {
            let found_inf = scaler.unscale(vs);
            scaler.update(found_inf);
            if found_inf {
                optimizer.zero_grad();
                return;
            }
        }
        if self.config.gradient_clip_val > 0.0 {
            optimizer.clip_grad_norm(self.config.gradient_clip_val);
        }
        optimizer.step();
        optimizer.zero_grad();
    }
}

/// Weighted mean of every metric over the validation batches.
fn validate<M: TrainingModule>(
    model: &mut M,
    ctx: &StepContext,
    autocast: bool,
) -> Result<Metrics> {
    let _guard = tch::no_grad_guard();

    let mut sums = Metrics::new();
    let mut total_weight = 0.0;
    for batch in model.val_dataloader()? {
        let batch = batch?;
        let output = tch::autocast(autocast, || model.validation_step(&batch, ctx))?;
        for (name, value) in output.metrics {
            *sums.entry(name).or_insert(0.0) += value * output.weight;
        }
        total_weight += output.weight;
    }

    if total_weight > 0.0 {
        for value in sums.values_mut() {
            *value /= total_weight;
        }
    }
    Ok(sums)
}

fn effective_precision(requested: Precision, device: Device) -> Precision {
    if requested == Precision::Mixed && !device.is_cuda() {
        warn!("16-bit mixed precision needs CUDA, falling back to 32 bit on {:?}", device);
        return Precision::Single;
    }
    requested
}

fn format_metrics(metrics: &Metrics) -> String {
    metrics
        .iter()
        .map(|(name, value)| format!("{}: {:.4}", name, value))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// `root/version_N` with N one past the highest existing version.
pub fn next_version_dir(root: &Path) -> Result<PathBuf> {
    let mut next = 0;
    if root.exists() {
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(version) = name
                .to_str()
                .and_then(|n| n.strip_prefix("version_"))
                .and_then(|n| n.parse::<usize>().ok())
            {
                next = next.max(version + 1);
            }
        }
    }
    Ok(root.join(format!("version_{}", next)))
}
