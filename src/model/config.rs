//! Model and training configuration

use std::path::Path;

use burn::config::Config;
use serde::{Deserialize, Serialize};

use super::resnet::NUM_UNITS;
use crate::dataset::POSITIVE_CLASS;
use crate::utils::error::{self, TrainError};

/// Configuration for the [`super::CovidClassifier`] network
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Backbone base width (64 for the standard ResNet50)
    #[config(default = "64")]
    pub base_width: usize,

    /// Units of the hidden dense layer in the head
    #[config(default = "256")]
    pub hidden_units: usize,

    /// Dropout rate between the dense layers
    #[config(default = "0.5")]
    pub dropout: f64,
}

/// Hyperparameters of a training run
///
/// Written to `logs/config.json` of every run; a JSON file with any subset
/// of these fields can be passed back in with `--config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Adam learning rate for the classifier phase
    pub learning_rate: f64,
    /// Adam learning rate for fine-tuning
    pub learning_rate_ft: f64,
    /// Classifier-phase epochs
    pub epochs: usize,
    /// Fine-tuning epochs
    pub epochs_ft: usize,
    /// First backbone unit trained during fine-tuning; lower units stay frozen
    pub fine_tune_at: usize,
    /// Side of the square network input
    pub image_size: usize,
    pub batch_size: usize,
    /// Epochs without training-loss improvement before stopping a phase
    pub early_stopping_patience: usize,
    /// Seed for epoch shuffling
    pub seed: u64,
    /// Class reported by the precision/recall metrics
    pub positive_class: String,
    /// Compensate class imbalance in the loss
    pub class_weights: bool,
    pub base_width: usize,
    pub hidden_units: usize,
    pub dropout: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let learning_rate = 1e-4;
        Self {
            learning_rate,
            learning_rate_ft: learning_rate / 10.0,
            epochs: 20,
            epochs_ft: 10,
            fine_tune_at: 14,
            image_size: 224,
            batch_size: 32,
            early_stopping_patience: 5,
            seed: 42,
            positive_class: POSITIVE_CLASS.to_string(),
            class_weights: false,
            base_width: 64,
            hidden_units: 256,
            dropout: 0.5,
        }
    }
}

impl TrainingConfig {
    /// Read a JSON config; missing fields take their defaults
    pub fn load(path: &Path) -> error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> error::Result<()> {
        let fail = |msg: String| Err(TrainError::Config(msg));

        let positive = |lr: f64| lr.is_finite() && lr > 0.0;
        if !positive(self.learning_rate) || !positive(self.learning_rate_ft) {
            return fail(format!(
                "learning rates must be positive (got {} and {})",
                self.learning_rate, self.learning_rate_ft
            ));
        }
        if self.batch_size == 0 {
            return fail("batch_size must be at least 1".to_string());
        }
        if self.image_size < 32 {
            return fail(format!("image_size must be at least 32 (got {})", self.image_size));
        }
        if self.fine_tune_at > NUM_UNITS {
            return fail(format!(
                "fine_tune_at must be at most {} (got {})",
                NUM_UNITS, self.fine_tune_at
            ));
        }
        if self.base_width == 0 || self.hidden_units == 0 {
            return fail("base_width and hidden_units must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1) (got {})", self.dropout));
        }
        Ok(())
    }

    /// Network config for `num_classes` outputs
    pub fn classifier(&self, num_classes: usize) -> ClassifierConfig {
        ClassifierConfig::new(num_classes)
            .with_base_width(self.base_width)
            .with_hidden_units(self.hidden_units)
            .with_dropout(self.dropout)
    }
}
