use tch::nn::{self, RNN};
use tch::Tensor;

use crate::config::DeepSpeechArgs;
use crate::layer_norm::CnnLayerNorm;

const CNN_CHANNELS: i64 = 32;

/// Pre-norm residual block of two 3x3 convolutions.
pub struct ResidualCnn {
    cnn1: nn::Conv2D,
    cnn2: nn::Conv2D,
    norm1: CnnLayerNorm,
    norm2: CnnLayerNorm,
    dropout: f64,
}

impl ResidualCnn {
    pub fn new(vs: &nn::Path, channels: i64, n_feats: i64, dropout: f64) -> Self {
        let conv = nn::ConvConfig {
            padding: 1,
            ..Default::default()
        };
        Self {
            cnn1: nn::conv2d(vs / "cnn1", channels, channels, 3, conv),
            cnn2: nn::conv2d(vs / "cnn2", channels, channels, 3, conv),
            norm1: CnnLayerNorm::new(&(vs / "norm1"), n_feats),
            norm2: CnnLayerNorm::new(&(vs / "norm2"), n_feats),
            dropout,
        }
    }

    pub fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        let out = self
            .norm1
            .forward(x)
            .gelu("none")
            .dropout(self.dropout, train)
            .apply(&self.cnn1);
        let out = self
            .norm2
            .forward(&out)
            .gelu("none")
            .dropout(self.dropout, train)
            .apply(&self.cnn2);
        out + x
    }
}

/// Layer norm, GELU, then a batch-first bidirectional GRU.
pub struct BidirectionalGru {
    norm: nn::LayerNorm,
    gru: nn::GRU,
    dropout: f64,
}

impl BidirectionalGru {
    pub fn new(vs: &nn::Path, input_dim: i64, hidden: i64, dropout: f64) -> Self {
        let config = nn::RNNConfig {
            bidirectional: true,
            batch_first: true,
            ..Default::default()
        };
        Self {
            norm: nn::layer_norm(vs / "layer_norm", vec![input_dim], Default::default()),
            gru: nn::gru(vs / "gru", input_dim, hidden, config),
            dropout,
        }
    }

    /// x: [batch, time, input_dim] -> [batch, time, 2 * hidden]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        let x = x.apply(&self.norm).gelu("none");
        let (out, _) = self.gru.seq(&x);
        out.dropout(self.dropout, train)
    }
}

/// DeepSpeech2-style acoustic model producing per-frame class logits.
pub struct DeepSpeechNet {
    cnn: nn::Conv2D,
    rescnn_layers: Vec<ResidualCnn>,
    fully_connected: nn::Linear,
    birnn_layers: Vec<BidirectionalGru>,
    classifier_hidden: nn::Linear,
    classifier_out: nn::Linear,
    dropout: f64,
    stride: i64,
}

impl DeepSpeechNet {
    pub fn new(vs: &nn::Path, args: &DeepSpeechArgs) -> Self {
        let n_feats = args.conv_feats();
        let cnn = nn::conv2d(
            vs / "cnn",
            1,
            CNN_CHANNELS,
            3,
            nn::ConvConfig {
                stride: args.stride,
                padding: 1,
                ..Default::default()
            },
        );

        let rescnn_layers = (0..args.n_cnn_layers)
            .map(|i| ResidualCnn::new(&(vs / "rescnn" / i), CNN_CHANNELS, n_feats, args.dropout))
            .collect();

        let fully_connected = nn::linear(
            vs / "fully_connected",
            n_feats * CNN_CHANNELS,
            args.rnn_dim,
            Default::default(),
        );

        let birnn_layers = (0..args.n_rnn_layers)
            .map(|i| {
                let input_dim = if i == 0 { args.rnn_dim } else { args.rnn_dim * 2 };
                BidirectionalGru::new(&(vs / "birnn" / i), input_dim, args.rnn_dim, args.dropout)
            })
            .collect();

        let classifier_hidden = nn::linear(
            vs / "classifier" / "hidden",
            args.rnn_dim * 2,
            args.rnn_dim,
            Default::default(),
        );
        let classifier_out = nn::linear(
            vs / "classifier" / "out",
            args.rnn_dim,
            args.n_class,
            Default::default(),
        );

        Self {
            cnn,
            rescnn_layers,
            fully_connected,
            birnn_layers,
            classifier_hidden,
            classifier_out,
            dropout: args.dropout,
            stride: args.stride,
        }
    }

    /// x: [batch, 1, n_feats, time] -> logits [batch, ceil(time / stride), n_class]
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor, tch::TchError> {
        let mut x = x.apply(&self.cnn);
        for layer in &self.rescnn_layers {
            x = layer.forward_t(&x, train);
        }

        let (b, c, f, t) = x.size4()?;
        let mut x = x.view([b, c * f, t]).transpose(1, 2).apply(&self.fully_connected);
        for layer in &self.birnn_layers {
            x = layer.forward_t(&x, train);
        }

        Ok(x
            .apply(&self.classifier_hidden)
            .gelu("none")
            .dropout(self.dropout, train)
            .apply(&self.classifier_out))
    }

    /// Frame counts after the strided stem.
    pub fn output_lengths(&self, input_lengths: &[i64]) -> Vec<i64> {
        input_lengths
            .iter()
            .map(|&len| (len + self.stride - 1) / self.stride)
            .collect()
    }
}
