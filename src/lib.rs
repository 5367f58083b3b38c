//! # COVIDx training
//!
//! Trains a COVID-19 chest X-ray classifier (ResNet50 backbone plus a dense
//! head) with the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: class-per-directory scan, Burn dataset and batcher
//! - `model`: ResNet50 backbone, classifier head and configuration
//! - `training`: class weights, loss, callbacks, history and the two-phase loop
//! - `utils`: errors, logging, metrics and learning-curve charts
//! - `backend`: compile-time backend selection
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use covidx_train::backend::{default_device, TrainingBackend};
//! use covidx_train::{run_training, TrainingConfig};
//!
//! let config = TrainingConfig { class_weights: true, ..Default::default() };
//! run_training::<TrainingBackend>(
//!     Path::new("data/covidx"),
//!     Path::new("models/run1"),
//!     &config,
//!     None,
//!     default_device(),
//! )?;
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{ImageFolder, XrayBatch, XrayBatcher, XrayDataset, XrayItem, POSITIVE_CLASS};
pub use model::{ClassifierConfig, CovidClassifier, Phase, TrainingConfig};
pub use training::{compute_class_weights, run_training, History, ModelPaths, Trainer};
pub use utils::error::{Result, TrainError};
pub use utils::metrics::{EpochMetrics, Metric};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
