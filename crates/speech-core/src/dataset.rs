use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPool;
use tch::{Kind, Tensor};

use crate::error::{Result, SpeechError};
use crate::text::TextTransform;

pub const MANIFEST_NAME: &str = "manifest.tsv";

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Saved `[n_feats, frames]` spectrogram.
    pub features: PathBuf,
    pub transcript: String,
}

/// Padded batch ready for the acoustic model.
#[derive(Debug)]
pub struct SpeechBatch {
    /// [batch, 1, n_feats, max_frames]
    pub spectrograms: Tensor,
    /// [batch, max_label_len], zero padded
    pub labels: Tensor,
    pub input_lengths: Vec<i64>,
    pub label_lengths: Vec<i64>,
    pub transcripts: Vec<String>,
}

impl SpeechBatch {
    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }
}

/// Utterances listed by one or more `manifest.tsv` files.
#[derive(Debug, Clone)]
pub struct SpeechDataset {
    items: Arc<Vec<Utterance>>,
}

impl SpeechDataset {
    pub fn new(items: Vec<Utterance>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }

    /// Reads `<features path>\t<transcript>` lines. Relative feature paths
    /// resolve against the manifest's directory; blank lines and `#` comments
    /// are skipped.
    pub fn from_manifest(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut items = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim_end();
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let (features, transcript) =
                line.split_once('\t').ok_or_else(|| SpeechError::Manifest {
                    path: path.display().to_string(),
                    line: index + 1,
                    reason: "expected <features>\\t<transcript>".to_string(),
                })?;
            items.push(Utterance {
                features: base.join(features.trim()),
                transcript: transcript.trim().to_lowercase(),
            });
        }

        Ok(Self::new(items))
    }

    /// Concatenates `root/<split>/manifest.tsv` for every split, in order.
    pub fn from_splits(root: &Path, splits: &[String]) -> Result<Self> {
        let mut items = Vec::new();
        for split in splits {
            let manifest = root.join(split).join(MANIFEST_NAME);
            let dataset = Self::from_manifest(&manifest)?;
            info!("Loaded {} utterances from {:?}", dataset.len(), manifest);
            items.extend(dataset.items.iter().cloned());
        }

        if items.is_empty() {
            return Err(SpeechError::EmptyDataset(format!(
                "{} has no utterances in {:?}",
                root.display(),
                splits
            )));
        }
        Ok(Self::new(items))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Utterance] {
        &self.items
    }

    /// Batches in file order, or shuffled when `shuffle_seed` is given.
    pub fn batches(
        &self,
        batch_size: usize,
        shuffle_seed: Option<u64>,
        text: TextTransform,
        pool: Option<Arc<ThreadPool>>,
    ) -> BatchIter {
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        if let Some(seed) = shuffle_seed {
            order.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        BatchIter {
            items: Arc::clone(&self.items),
            order,
            batch_size: batch_size.max(1),
            cursor: 0,
            text,
            pool,
        }
    }
}

pub struct BatchIter {
    items: Arc<Vec<Utterance>>,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    text: TextTransform,
    pool: Option<Arc<ThreadPool>>,
}

impl BatchIter {
    fn load(&self, chunk: &[usize]) -> Result<SpeechBatch> {
        let utterances: Vec<&Utterance> = chunk.iter().map(|&i| &self.items[i]).collect();
        let features = match &self.pool {
            Some(pool) => pool.install(|| {
                utterances
                    .par_iter()
                    .map(|u| load_features(&u.features))
                    .collect::<Result<Vec<_>>>()
            })?,
            None => utterances
                .iter()
                .map(|u| load_features(&u.features))
                .collect::<Result<Vec<_>>>()?,
        };
        let transcripts = utterances.iter().map(|u| u.transcript.clone()).collect();
        collate(features, transcripts, &self.text)
    }
}

impl Iterator for BatchIter {
    type Item = Result<SpeechBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let chunk = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        Some(self.load(&chunk))
    }
}

/// Loads a `[n_feats, frames]` float tensor saved with `Tensor::save`.
pub fn load_features(path: &Path) -> Result<Tensor> {
    let tensor = Tensor::load(path)?;
    if tensor.dim() != 2 {
        return Err(SpeechError::BadFeatures {
            path: path.display().to_string(),
            reason: format!("expected 2 dims, got shape {:?}", tensor.size()),
        });
    }
    Ok(tensor.to_kind(Kind::Float))
}

/// Pads spectrograms along time and labels along length to the batch maximum.
pub fn collate(
    features: Vec<Tensor>,
    transcripts: Vec<String>,
    text: &TextTransform,
) -> Result<SpeechBatch> {
    let first = features
        .first()
        .ok_or_else(|| SpeechError::EmptyDataset("cannot collate an empty batch".to_string()))?;
    let n_feats = first.size()[0];

    let labels: Vec<Vec<i64>> = transcripts
        .iter()
        .map(|t| text.text_to_int(t))
        .collect::<Result<_>>()?;

    let input_lengths: Vec<i64> = features.iter().map(|f| f.size()[1]).collect();
    let label_lengths: Vec<i64> = labels.iter().map(|l| l.len() as i64).collect();
    let max_frames = input_lengths.iter().copied().max().unwrap_or(0);
    let max_label = label_lengths.iter().copied().max().unwrap_or(0).max(1);
    let batch = features.len() as i64;

    let spectrograms = Tensor::zeros(
        [batch, 1, n_feats, max_frames],
        (Kind::Float, first.device()),
    );
    let padded_labels = Tensor::zeros([batch, max_label], (Kind::Int64, first.device()));

    for (i, (feature, label)) in features.iter().zip(&labels).enumerate() {
        let size = feature.size();
        if size[0] != n_feats {
            return Err(SpeechError::BadFeatures {
                path: format!("batch item {}", i),
                reason: format!("expected {} feature rows, got {}", n_feats, size[0]),
            });
        }
        spectrograms
            .get(i as i64)
            .get(0)
            .narrow(1, 0, size[1])
            .copy_(feature);
        if !label.is_empty() {
            padded_labels
                .get(i as i64)
                .narrow(0, 0, label.len() as i64)
                .copy_(&Tensor::from_slice(label));
        }
    }

    Ok(SpeechBatch {
        spectrograms,
        labels: padded_labels,
        input_lengths,
        label_lengths,
        transcripts,
    })
}
