use std::fs;

use tch::{nn, nn::Module, nn::OptimizerConfig, Device, Kind, Tensor};
use trainer::{
    EarlyStopping, Loader, Result, StepContext, Trainer, TrainerConfig, TrainingModule,
    ValidationOutput,
};

/// One-weight linear regression with a fixed validation score.
struct Line {
    vs: nn::VarStore,
    layer: nn::Linear,
    batches: usize,
    val_score: f64,
}

impl Line {
    fn new(batches: usize, val_score: f64) -> Self {
        let vs = nn::VarStore::new(Device::Cpu);
        let layer = nn::linear(vs.root() / "layer", 1, 1, Default::default());
        Self {
            vs,
            layer,
            batches,
            val_score,
        }
    }

    fn batch(i: usize) -> (Tensor, Tensor) {
        let x = Tensor::from_slice(&[i as f32, i as f32 + 0.5]).view([2, 1]);
        let y = &x * 2.0 + 1.0;
        (x, y)
    }
}

impl TrainingModule for Line {
    type Batch = (Tensor, Tensor);

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    fn configure_optimizer(&self) -> Result<nn::Optimizer> {
        Ok(nn::Sgd::default().build(&self.vs, 0.01)?)
    }

    fn train_dataloader(&self, _epoch: usize) -> Result<Loader<Self::Batch>> {
        let batches: Vec<_> = (0..self.batches).map(Line::batch).collect();
        Ok(Box::new(batches.into_iter().map(Ok)))
    }

    fn val_dataloader(&self) -> Result<Loader<Self::Batch>> {
        Ok(Box::new(vec![Line::batch(0), Line::batch(1)].into_iter().map(Ok)))
    }

    fn training_step(&mut self, batch: &Self::Batch, ctx: &StepContext) -> Result<Tensor> {
        let (x, y) = batch;
        let pred = self.layer.forward(&x.to_device(ctx.device).to_kind(ctx.kind));
        Ok(pred.mse_loss(&y.to_device(ctx.device).to_kind(ctx.kind), tch::Reduction::Mean))
    }

    fn validation_step(
        &mut self,
        batch: &Self::Batch,
        ctx: &StepContext,
    ) -> Result<ValidationOutput> {
        let loss = self.training_step(batch, ctx)?.double_value(&[]);
        let mut output = ValidationOutput {
            weight: 2.0,
            ..Default::default()
        };
        output.metrics.insert("val_loss".to_string(), loss);
        output.metrics.insert("wer".to_string(), self.val_score);
        Ok(output)
    }
}

fn config(root: &std::path::Path) -> TrainerConfig {
    TrainerConfig {
        max_epochs: 4,
        accumulate_grad_batches: 2,
        default_root_dir: root.to_string_lossy().into_owned(),
        log_every_n_steps: 1,
        ..Default::default()
    }
}

#[test]
fn fit_runs_all_epochs_and_writes_hparams() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Line::new(5, 0.5);
    let mut trainer = Trainer::new(config(dir.path())).unwrap();

    let summary = trainer.fit(&mut model).unwrap();

    assert_eq!(summary.epochs_completed, 4);
    assert!(!summary.stopped_early);
    // 5 batches with accumulation 2: steps after batch 2, 4 and the leftover 5.
    assert_eq!(summary.global_step, 12);
    assert_eq!(summary.metrics["wer"], 0.5);
    assert!(summary.metrics.contains_key("train_loss"));
    assert!(summary.log_dir.ends_with("version_0"));
    assert!(fs::metadata(summary.log_dir.join("hparams.yaml")).is_ok());
}

#[test]
fn early_stopping_ends_fit() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Line::new(2, 0.3);
    let early_stop = EarlyStopping::new("wer", 2).verbose(true);
    let mut trainer = Trainer::new(TrainerConfig {
        max_epochs: 10,
        ..config(dir.path())
    })
    .unwrap()
    .with_callback(Box::new(early_stop));

    let summary = trainer.fit(&mut model).unwrap();

    // Epoch 0 sets the best score, epochs 1 and 2 exhaust patience.
    assert!(summary.stopped_early);
    assert_eq!(summary.epochs_completed, 3);
}

#[test]
fn missing_monitor_fails_fit() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Line::new(1, 0.3);
    let mut trainer = Trainer::new(config(dir.path()))
        .unwrap()
        .with_callback(Box::new(EarlyStopping::new("val_acc", 3)));

    let err = trainer.fit(&mut model).unwrap_err();
    assert!(err.to_string().contains("val_acc"));
}

#[test]
fn double_precision_casts_the_module() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Line::new(1, 0.3);
    let mut trainer = Trainer::new(TrainerConfig {
        max_epochs: 1,
        precision: 64,
        ..config(dir.path())
    })
    .unwrap();

    trainer.fit(&mut model).unwrap();

    for (_, var) in model.var_store().variables() {
        assert_eq!(var.kind(), Kind::Double);
    }
}

#[test]
fn mixed_precision_on_cpu_still_trains() {
    let dir = tempfile::tempdir().unwrap();
    let mut model = Line::new(3, 0.3);
    let mut trainer = Trainer::new(TrainerConfig {
        max_epochs: 1,
        precision: 16,
        use_amp: true,
        gradient_clip_val: 0.5,
        ..config(dir.path())
    })
    .unwrap();

    let summary = trainer.fit(&mut model).unwrap();
    assert_eq!(summary.epochs_completed, 1);
    assert_eq!(summary.global_step, 2);
}
