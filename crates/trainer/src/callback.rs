use log::info;

use crate::error::{Result, TrainerError};
use crate::module::Metrics;
use crate::TrainerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Hooks the trainer calls around the fit loop.
pub trait Callback {
    fn on_fit_start(&mut self, _config: &TrainerConfig) -> Result<()> {
        Ok(())
    }

    /// Called once per epoch with the aggregated validation metrics.
    fn on_validation_end(&mut self, epoch: usize, metrics: &Metrics) -> Result<CallbackAction>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Min,
    Max,
    /// Max when the monitored name contains "acc", otherwise min.
    Auto,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: String,
    patience: usize,
    min_delta: f64,
    mode: Mode,
    verbose: bool,
    strict: bool,
    best_score: f64,
    wait_count: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(monitor: impl Into<String>, patience: usize) -> Self {
        let monitor = monitor.into();
        let mode = Mode::Auto;
        Self {
            best_score: initial_best(resolve_mode(mode, &monitor)),
            monitor,
            patience,
            min_delta: 0.0,
            mode,
            verbose: false,
            strict: true,
            wait_count: 0,
            stopped_epoch: None,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta.abs();
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self.best_score = initial_best(self.resolved_mode());
        self
    }

    /// Whether a missing monitored metric is an error (true) or skipped.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn monitor(&self) -> &str {
        &self.monitor
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn wait_count(&self) -> usize {
        self.wait_count
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    pub fn resolved_mode(&self) -> Mode {
        resolve_mode(self.mode, &self.monitor)
    }

    fn improved(&self, current: f64) -> bool {
        match self.resolved_mode() {
            Mode::Max => current > self.best_score + self.min_delta,
            _ => current < self.best_score - self.min_delta,
        }
    }

    /// Feeds one monitored value and returns whether training should stop.
    pub fn should_stop(&mut self, epoch: usize, current: f64) -> bool {
        if self.stopped_epoch.is_some() {
            return true;
        }

        if self.improved(current) {
            if self.verbose {
                info!(
                    "Metric {} improved to {:.4} (previous best {:.4})",
                    self.monitor, current, self.best_score
                );
            }
            self.best_score = current;
            self.wait_count = 0;
            return false;
        }

        self.wait_count += 1;
        if self.wait_count >= self.patience {
            self.stopped_epoch = Some(epoch);
            if self.verbose {
                info!(
                    "Epoch {}: early stopping, {} did not improve for {} validation runs \
                     (best {:.4})",
                    epoch, self.monitor, self.wait_count, self.best_score
                );
            }
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.best_score = initial_best(self.resolved_mode());
        self.wait_count = 0;
        self.stopped_epoch = None;
    }
}

impl Callback for EarlyStopping {
    fn on_fit_start(&mut self, _config: &TrainerConfig) -> Result<()> {
        self.reset();
        Ok(())
    }

    fn on_validation_end(&mut self, epoch: usize, metrics: &Metrics) -> Result<CallbackAction> {
        let current = match metrics.get(&self.monitor) {
            Some(value) => *value,
            None if self.strict => {
                return Err(TrainerError::MissingMetric {
                    monitor: self.monitor.clone(),
                    available: metrics.keys().cloned().collect(),
                })
            }
            None => return Ok(CallbackAction::Continue),
        };

        if self.should_stop(epoch, current) {
            Ok(CallbackAction::Stop)
        } else {
            Ok(CallbackAction::Continue)
        }
    }
}

fn resolve_mode(mode: Mode, monitor: &str) -> Mode {
    match mode {
        Mode::Auto if monitor.contains("acc") => Mode::Max,
        Mode::Auto => Mode::Min,
        other => other,
    }
}

fn initial_best(mode: Mode) -> f64 {
    match mode {
        Mode::Max => f64::NEG_INFINITY,
        _ => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(name: &str, value: f64) -> Metrics {
        let mut m = Metrics::new();
        m.insert(name.to_string(), value);
        m
    }

    #[test]
    fn stops_after_patience_without_improvement() {
        let mut es = EarlyStopping::new("wer", 3);
        assert!(!es.should_stop(0, 0.9));
        assert!(!es.should_stop(1, 0.8));
        assert!(!es.should_stop(2, 0.85));
        assert!(!es.should_stop(3, 0.8));
        assert!(es.should_stop(4, 0.81));
        assert_eq!(es.stopped_epoch(), Some(4));
        assert_eq!(es.best_score(), 0.8);
    }

    #[test]
    fn improvement_resets_wait_count() {
        let mut es = EarlyStopping::new("wer", 2);
        es.should_stop(0, 0.5);
        es.should_stop(1, 0.6);
        assert_eq!(es.wait_count(), 1);
        es.should_stop(2, 0.4);
        assert_eq!(es.wait_count(), 0);
    }

    #[test]
    fn auto_mode_maximizes_accuracy() {
        let mut es = EarlyStopping::new("val_acc", 1);
        assert_eq!(es.resolved_mode(), Mode::Max);
        assert!(!es.should_stop(0, 0.5));
        assert!(!es.should_stop(1, 0.6));
        assert!(es.should_stop(2, 0.55));
    }

    #[test]
    fn min_delta_requires_margin() {
        let mut es = EarlyStopping::new("val_loss", 1).min_delta(0.1);
        assert!(!es.should_stop(0, 1.0));
        assert!(es.should_stop(1, 0.95));
    }

    #[test]
    fn strict_missing_metric_is_error() {
        let mut es = EarlyStopping::new("wer", 3);
        let err = es
            .on_validation_end(0, &metrics("val_loss", 1.0))
            .unwrap_err();
        match err {
            TrainerError::MissingMetric { monitor, available } => {
                assert_eq!(monitor, "wer");
                assert_eq!(available, vec!["val_loss".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lenient_missing_metric_continues() {
        let mut es = EarlyStopping::new("wer", 3).strict(false);
        let action = es.on_validation_end(0, &metrics("val_loss", 1.0)).unwrap();
        assert_eq!(action, CallbackAction::Continue);
    }

    #[test]
    fn callback_reports_stop() {
        let mut es = EarlyStopping::new("wer", 1).verbose(true);
        assert_eq!(
            es.on_validation_end(0, &metrics("wer", 0.3)).unwrap(),
            CallbackAction::Continue
        );
        assert_eq!(
            es.on_validation_end(1, &metrics("wer", 0.3)).unwrap(),
            CallbackAction::Stop
        );
    }
}
