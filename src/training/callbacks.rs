//! Per-epoch callbacks: early stopping and weight checkpoints

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::backend::Backend,
};
use tracing::{debug, info};

use crate::model::CovidClassifier;
use crate::utils::error::Result;

/// Extension written by [`CompactRecorder`]
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// Outcome of feeding one epoch's monitored value to [`EarlyStopping`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCheck {
    /// New best value; its weights should be kept
    Improved,
    /// No improvement, still within patience
    Waiting,
    /// Patience exhausted; stop and restore the weights of `best_epoch`, if
    /// any epoch ever produced a usable value
    Stop { best_epoch: Option<usize> },
}

/// Stops a phase when the monitored loss has not decreased for `patience` epochs
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<f64>,
    best_epoch: usize,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            best_epoch: 0,
            wait: 0,
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best.map(|_| self.best_epoch)
    }

    /// Record the monitored value of `epoch` (lower is better)
    pub fn update(&mut self, epoch: usize, value: f64) -> StopCheck {
        let improved = match self.best {
            None => !value.is_nan(),
            Some(best) => value < best,
        };

        if improved {
            self.best = Some(value);
            self.best_epoch = epoch;
            self.wait = 0;
            return StopCheck::Improved;
        }

        self.wait += 1;
        debug!(
            "No improvement for {} epoch(s) (best {:?} at epoch {})",
            self.wait,
            self.best,
            self.best_epoch + 1
        );

        if self.wait >= self.patience {
            StopCheck::Stop {
                best_epoch: self.best_epoch(),
            }
        } else {
            StopCheck::Waiting
        }
    }
}

/// Saves the model weights after every epoch as `<dir>/<epoch:02>.mpk`
#[derive(Debug, Clone)]
pub struct EpochCheckpointer {
    dir: PathBuf,
    recorder: CompactRecorder,
}

impl EpochCheckpointer {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            recorder: CompactRecorder::new(),
        }
    }

    /// Checkpoint file of 0-based `epoch`; names are 1-based and zero-padded
    pub fn path_for(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{:02}.{}", epoch + 1, CHECKPOINT_EXTENSION))
    }

    pub fn save<B: Backend>(&self, model: &CovidClassifier<B>, epoch: usize) -> Result<PathBuf> {
        let path = self.path_for(epoch);
        model.clone().save_file(path.clone(), &self.recorder)?;
        info!("Epoch {}: saved checkpoint to {}", epoch + 1, path.display());
        Ok(path)
    }
}
