use tch::{nn, Tensor};

/// Layer norm over the feature axis of a conv activation.
#[derive(Debug)]
pub struct CnnLayerNorm {
    norm: nn::LayerNorm,
}

impl CnnLayerNorm {
    pub fn new(vs: &nn::Path, n_feats: i64) -> Self {
        let norm = nn::layer_norm(vs / "layer_norm", vec![n_feats], Default::default());
        Self { norm }
    }

    /// x: [batch, channels, n_feats, time]
    pub fn forward(&self, x: &Tensor) -> Tensor {
        x.transpose(2, 3).apply(&self.norm).transpose(2, 3)
    }
}
