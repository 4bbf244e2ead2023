use log::debug;
use tch::{nn, Tensor};

/// Dynamic loss scaling for 16-bit autocast.
///
/// The loss is multiplied by `scale` before backward. Before each optimizer
/// step the gradients are divided back; a step whose gradients hold inf or
/// NaN is skipped and the scale halves. After `growth_interval` clean steps in
/// a row the scale doubles.
#[derive(Debug, Clone)]
pub struct GradScaler {
    scale: f64,
    growth_factor: f64,
    backoff_factor: f64,
    growth_interval: usize,
    clean_steps: usize,
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new(65536.0, 2000)
    }
}

impl GradScaler {
    pub fn new(init_scale: f64, growth_interval: usize) -> Self {
        Self {
            scale: init_scale,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: growth_interval.max(1),
            clean_steps: 0,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn scale_loss(&self, loss: &Tensor) -> Tensor {
        loss * self.scale
    }

    /// Divides every gradient in `vs` by the current scale in place.
    /// Returns true when any gradient is not finite.
    pub fn unscale(&self, vs: &nn::VarStore) -> bool {
        let inv = 1.0 / self.scale;
        let mut found_inf = false;
        for var in vs.trainable_variables() {
            let mut grad = var.grad();
            if !grad.defined() {
                continue;
            }
            grad *= inv;
            if !found_inf && grad.isfinite().all().int64_value(&[]) == 0 {
                found_inf = true;
            }
        }
        found_inf
    }

    pub fn update(&mut self, found_inf: bool) {
        if found_inf {
            self.scale *= self.backoff_factor;
            self.clean_steps = 0;
            debug!("Non-finite gradients, loss scale lowered to {}", self.scale);
            return;
        }
        self.clean_steps += 1;
        if self.clean_steps >= self.growth_interval {
            self.scale *= self.growth_factor;
            self.clean_steps = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    fn backward_through(vs: &nn::VarStore, scaler: &GradScaler, value: f64) {
        let loss = vs.trainable_variables()[0].sum(Kind::Float) * value;
        scaler.scale_loss(&loss).backward();
    }

    #[test]
    fn unscale_restores_true_gradients() {
        let vs = nn::VarStore::new(Device::Cpu);
        let _w = vs.root().zeros("w", &[3]);
        let scaler = GradScaler::new(1024.0, 10);

        backward_through(&vs, &scaler, 2.0);
        let grad = vs.trainable_variables()[0].grad();
        assert_eq!(grad.double_value(&[0]), 2048.0);

        assert!(!scaler.unscale(&vs));
        let grad = vs.trainable_variables()[0].grad();
        assert_eq!(grad.double_value(&[1]), 2.0);
    }

    #[test]
    fn overflowing_gradients_are_reported() {
        let vs = nn::VarStore::new(Device::Cpu);
        let _w = vs.root().zeros("w", &[2]);
        let scaler = GradScaler::new(1.0, 10);

        backward_through(&vs, &scaler, f64::INFINITY);
        assert!(scaler.unscale(&vs));
    }

    #[test]
    fn scale_backs_off_then_grows() {
        let mut scaler = GradScaler::new(8.0, 2);
        scaler.update(true);
        assert_eq!(scaler.scale(), 4.0);

        scaler.update(false);
        assert_eq!(scaler.scale(), 4.0);
        scaler.update(false);
        assert_eq!(scaler.scale(), 8.0);

        scaler.update(false);
        scaler.update(true);
        scaler.update(false);
        assert_eq!(scaler.scale(), 4.0);
    }
}
