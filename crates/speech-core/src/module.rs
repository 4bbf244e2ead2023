use std::sync::Arc;

use log::info;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tch::nn::{self, OptimizerConfig};
use tch::{Device, Tensor};
use trainer::{Loader, StepContext, TrainerError, TrainingModule, ValidationOutput};

use crate::config::DeepSpeechConfig;
use crate::dataset::{SpeechBatch, SpeechDataset};
use crate::decoder::greedy_decode;
use crate::deepspeech::DeepSpeechNet;
use crate::error::Result;
use crate::metrics::{cer, wer};
use crate::text::{TextTransform, BLANK};

/// The acoustic model plus its data, loss and optimizer setup.
pub struct DeepSpeech {
    config: DeepSpeechConfig,
    vs: nn::VarStore,
    net: DeepSpeechNet,
    text: TextTransform,
    train_set: SpeechDataset,
    val_set: SpeechDataset,
    pool: Option<Arc<ThreadPool>>,
}

impl DeepSpeech {
    pub fn new(config: DeepSpeechConfig) -> Result<Self> {
        config.validate()?;

        let train_set = SpeechDataset::from_splits(&config.data_root, &config.data_url)?;
        let val_set =
            SpeechDataset::from_splits(&config.data_root, &[config.model.val_url.clone()])?;

        let pool = if config.num_workers > 0 {
            Some(Arc::new(
                ThreadPoolBuilder::new()
                    .num_threads(config.num_workers)
                    .thread_name(|i| format!("loader-{}", i))
                    .build()?,
            ))
        } else {
            None
        };

        let vs = nn::VarStore::new(Device::Cpu);
        let net = DeepSpeechNet::new(&vs.root(), &config.model);
        info!(
            "DeepSpeech: {} CNN / {} RNN blocks, rnn_dim {}, {} parameters, \
             {} train / {} val utterances",
            config.model.n_cnn_layers,
            config.model.n_rnn_layers,
            config.model.rnn_dim,
            num_parameters(&vs),
            train_set.len(),
            val_set.len()
        );

        Ok(Self {
            config,
            vs,
            net,
            text: TextTransform::new(),
            train_set,
            val_set,
            pool,
        })
    }

    pub fn config(&self) -> &DeepSpeechConfig {
        &self.config
    }

    pub fn net(&self) -> &DeepSpeechNet {
        &self.net
    }

    /// Mean CTC loss and the per-frame logits of a batch.
    fn ctc_loss(
        &self,
        batch: &SpeechBatch,
        ctx: &StepContext,
        train: bool,
    ) -> Result<(Tensor, Tensor)> {
        let spectrograms = batch.spectrograms.to_device(ctx.device).to_kind(ctx.kind);
        let labels = batch.labels.to_device(ctx.device);

        let logits = self.net.forward_t(&spectrograms, train)?;
        let log_probs = logits.log_softmax(2, ctx.kind).transpose(0, 1);
        let input_lengths = self.net.output_lengths(&batch.input_lengths);

        let loss = Tensor::ctc_loss(
            &log_probs,
            &labels,
            input_lengths.as_slice(),
            batch.label_lengths.as_slice(),
            BLANK,
            tch::Reduction::Mean,
            false,
        );
        Ok((loss, logits))
    }

    /// Greedy transcripts for each batch item.
    pub fn decode(&self, logits: &Tensor, input_lengths: &[i64]) -> Result<Vec<String>> {
        let frames = logits.size()[1] as usize;
        let best = logits.argmax(2, false).to_device(Device::Cpu).flatten(0, -1);
        let best = Vec::<i64>::try_from(&best)?;
        let lengths = self.net.output_lengths(input_lengths);

        Ok(best
            .chunks(frames.max(1))
            .zip(lengths)
            .map(|(row, len)| {
                let len = (len.max(0) as usize).min(row.len());
                self.text.int_to_text(&greedy_decode(&row[..len], BLANK))
            })
            .collect())
    }
}

impl TrainingModule for DeepSpeech {
    type Batch = SpeechBatch;

    fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    fn configure_optimizer(&self) -> trainer::Result<nn::Optimizer> {
        Ok(nn::AdamW::default().build(&self.vs, self.config.learning_rate)?)
    }

    fn train_dataloader(&self, epoch: usize) -> trainer::Result<Loader<SpeechBatch>> {
        let seed = self.config.seed.wrapping_add(epoch as u64);
        let batches = self.train_set.batches(
            self.config.batch_size,
            Some(seed),
            self.text,
            self.pool.clone(),
        );
        Ok(Box::new(batches.map(|b| b.map_err(TrainerError::from))))
    }

    fn val_dataloader(&self) -> trainer::Result<Loader<SpeechBatch>> {
        let batches = self
            .val_set
            .batches(self.config.batch_size, None, self.text, self.pool.clone());
        Ok(Box::new(batches.map(|b| b.map_err(TrainerError::from))))
    }

    fn training_step(&mut self, batch: &SpeechBatch, ctx: &StepContext) -> trainer::Result<Tensor> {
        let (loss, _) = self.ctc_loss(batch, ctx, true)?;
        Ok(loss)
    }

    fn validation_step(
        &mut self,
        batch: &SpeechBatch,
        ctx: &StepContext,
    ) -> trainer::Result<ValidationOutput> {
        let (loss, logits) = self.ctc_loss(batch, ctx, false)?;
        let predictions = self.decode(&logits, &batch.input_lengths)?;

        let n = batch.len().max(1) as f64;
        let (wer_sum, cer_sum) = predictions
            .iter()
            .zip(&batch.transcripts)
            .fold((0.0, 0.0), |(w, c), (hyp, reference)| {
                (w + wer(reference, hyp), c + cer(reference, hyp))
            });

        let mut output = ValidationOutput {
            weight: batch.len() as f64,
            ..Default::default()
        };
        output.metrics.insert("val_loss".to_string(), loss.double_value(&[]));
        output.metrics.insert("wer".to_string(), wer_sum / n);
        output.metrics.insert("cer".to_string(), cer_sum / n);
        Ok(output)
    }

    fn hparams(&self) -> trainer::Result<serde_yaml::Value> {
        Ok(serde_yaml::to_value(&self.config)?)
    }
}

fn num_parameters(vs: &nn::VarStore) -> i64 {
    vs.trainable_variables().iter().map(Tensor::numel).map(|n| n as i64).sum()
}

impl std::fmt::Debug for DeepSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepSpeech")
            .field("config", &self.config)
            .field("train_utterances", &self.train_set.len())
            .field("val_utterances", &self.val_set.len())
            .finish()
    }
}
