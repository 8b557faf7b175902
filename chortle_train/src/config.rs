use burn::config::Config;
use chortle_core::labels::NUM_LABELS;
use chortle_core::{Error, FeatureConfig, SplitConfig};
use serde::{Deserialize, Serialize};

use crate::loss::TripletLossConfig;
use crate::model::EmbeddingNetConfig;

/// Which network activation serves as the embedding vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingSpace {
    /// Softmax output. Bounded, sums to one.
    Probabilities,
    /// Output layer before softmax.
    Logits,
    /// Sigmoid hidden layer.
    Hidden,
}

#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "EmbeddingNetConfig::new()")]
    pub model: EmbeddingNetConfig,
    #[config(default = "TripletLossConfig::new()")]
    pub loss: TripletLossConfig,
    #[config(default = "FeatureConfig::default()")]
    pub features: FeatureConfig,
    #[config(default = "SplitConfig::default()")]
    pub split: SplitConfig,
    #[config(default = 0.01)]
    pub learning_rate: f64,
    /// Clips per step; a multiple of 3.
    #[config(default = 60)]
    pub batch_size: usize,
    #[config(default = 10)]
    pub iterations: usize,
    #[config(default = "EmbeddingSpace::Probabilities")]
    pub embedding_space: EmbeddingSpace,
    /// Weight of a cross-entropy term on the softmax head. Zero trains on the
    /// triplet loss alone.
    #[config(default = 0.0)]
    pub classification_weight: f64,
    /// Clips per forward pass during evaluation.
    #[config(default = 30)]
    pub eval_batch_size: usize,
}

impl TrainingConfig {
    /// Checked before any clip is read.
    pub fn validate(&self) -> chortle_core::Result<()> {
        if self.batch_size == 0 || self.batch_size % 3 != 0 {
            return Err(Error::MalformedBatch {
                rows: self.batch_size,
            });
        }
        if self.iterations == 0 {
            return Err(Error::InvalidConfig("iterations must be positive".into()));
        }
        if self.eval_batch_size == 0 {
            return Err(Error::InvalidConfig("eval_batch_size must be positive".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig("learning_rate must be positive".into()));
        }
        if !(self.loss.margin >= 0.0) || !(self.classification_weight >= 0.0) {
            return Err(Error::InvalidConfig(
                "margin and classification_weight must be non-negative".into(),
            ));
        }
        if !(self.split.train_ratio > 0.0 && self.split.train_ratio < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "train_ratio must be in (0, 1), got {}",
                self.split.train_ratio
            )));
        }

        self.features.validate()?;
        self.model.validate()?;

        if self.model.bands != self.features.bands || self.model.frames != self.features.frames() {
            return Err(Error::InvalidConfig(format!(
                "model expects {}x{} features, extractor produces {}x{}",
                self.model.bands,
                self.model.frames,
                self.features.bands,
                self.features.frames()
            )));
        }
        if self.model.channels != FeatureConfig::CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "model expects {} channels, features have {}",
                self.model.channels,
                FeatureConfig::CHANNELS
            )));
        }
        if self.model.num_labels != NUM_LABELS {
            return Err(Error::InvalidConfig(format!(
                "model has {} outputs for {NUM_LABELS} categories",
                self.model.num_labels
            )));
        }
        Ok(())
    }
}
