//! ResNet50 backbone with a dense classification head
//!
//! Head: global average pooling → Linear(2048, 256) → ReLU → Dropout(0.5) →
//! Linear(256, n_classes). The network outputs logits; softmax is left to the
//! loss and the metrics.
//!
//! ## Freezing
//!
//! Frozen backbone units run on the inner (non-autodiff) backend through
//! [`AutodiffModule::valid`], and their output re-enters the graph as a
//! constant. Frozen units therefore receive no gradients. Trainable units
//! normalize with their running statistics too ([`NormMode::Running`]), so a
//! training pass computes the same function as inference apart from dropout
//! and the pretrained statistics are never overwritten.

use std::path::Path;

use burn::{
    module::{AutodiffModule, Module},
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};
use serde::{Deserialize, Serialize};

use super::config::ClassifierConfig;
use super::resnet::{NormMode, ResNet50, NUM_UNITS};
use crate::utils::error::Result;

/// Which part of the network a training phase updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Head only, whole backbone frozen
    Classifier,
    /// Backbone units from `fine_tune_at` onwards plus the head
    FineTune { fine_tune_at: usize },
}

impl Phase {
    /// Index of the first backbone unit that trains
    pub fn first_trainable_unit(self) -> usize {
        match self {
            Phase::Classifier => NUM_UNITS,
            Phase::FineTune { fine_tune_at } => fine_tune_at.min(NUM_UNITS),
        }
    }

    /// Whether backbone unit `unit` is frozen in this phase
    pub fn is_frozen(self, unit: usize) -> bool {
        unit < self.first_trainable_unit()
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Classifier => "classifier",
            Phase::FineTune { .. } => "fine_tune",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// COVID-19 chest X-ray classifier
#[derive(Module, Debug)]
pub struct CovidClassifier<B: Backend> {
    pub backbone: ResNet50<B>,
    pub pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub relu: Relu,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
    num_classes: usize,
}

impl ClassifierConfig {
    /// Build a randomly initialised classifier
    pub fn init<B: Backend>(&self, device: &B::Device) -> CovidClassifier<B> {
        let backbone = ResNet50::new(self.base_width, device);
        let features = backbone.out_channels();

        CovidClassifier {
            backbone,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(features, self.hidden_units).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
            num_classes: self.num_classes,
        }
    }
}

impl<B: Backend> CovidClassifier<B> {
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Logits with shape [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head(self.backbone.forward(images))
    }

    fn head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(features);
        let [batch, channels, _, _] = x.dims();
        let x: Tensor<B, 2> = x.reshape([batch, channels]);

        let x = self.relu.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Replace the backbone with weights from a named MessagePack record
    pub fn load_backbone(mut self, path: &Path, device: &B::Device) -> Result<Self> {
        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.to_path_buf(), device)?;
        self.backbone = self.backbone.load_record(record);
        Ok(self)
    }

    /// Write the backbone weights in the format [`Self::load_backbone`] reads
    pub fn save_backbone(&self, path: &Path) -> Result<()> {
        self.backbone
            .clone()
            .save_file(path.to_path_buf(), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())?;
        Ok(())
    }
}

impl<B: AutodiffBackend> CovidClassifier<B> {
    /// Training forward pass with the units frozen by `phase` cut out of the graph
    pub fn forward_train(&self, images: Tensor<B, 4>, phase: Phase) -> Tensor<B, 2> {
        let split = phase.first_trainable_unit();

        let x = if split > 0 {
            let frozen = self.backbone.valid();
            Tensor::from_inner(frozen.forward_units(images.inner(), 0..split, NormMode::Running))
        } else {
            images
        };

        self.head(self.backbone.forward_units(x, split..NUM_UNITS, NormMode::Running))
    }
}
