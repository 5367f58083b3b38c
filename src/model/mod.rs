//! Model definitions
//!
//! - [`resnet`]: ResNet50 backbone split into freezable units
//! - [`classifier`]: backbone plus dense head, phase-aware training forward
//! - [`config`]: network and run configuration

pub mod classifier;
pub mod config;
pub mod resnet;

pub use classifier::{CovidClassifier, Phase};
pub use config::{ClassifierConfig, TrainingConfig};
pub use resnet::{NormMode, ResNet50, NUM_UNITS};
