//! End-to-end training run
//!
//! prepare output directory → load splits → class weights → build model →
//! classifier phase → save `model_no_ft` → fine-tuning → save `model` →
//! history and learning curves.

use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use colored::Colorize;
use tracing::{info, warn};

use crate::dataset::{ImageFolder, XrayDataset, TRAIN_DIR, VALIDATION_DIR};
use crate::model::TrainingConfig;
use crate::training::callbacks::EpochCheckpointer;
use crate::training::class_weights::compute_class_weights;
use crate::training::history::{EpochLog, History};
use crate::training::trainer::Trainer;
use crate::utils::charts::plot_learning_curves;
use crate::utils::error::{Result, TrainError};
use crate::utils::metrics::ConfusionMatrix;

/// Files and directories of one run
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub root: PathBuf,
    pub checkpoints: PathBuf,
    pub logs: PathBuf,
    pub plots: PathBuf,
    /// Weights after the classifier phase (without extension)
    pub model_no_ft: PathBuf,
    /// Final weights (without extension)
    pub model: PathBuf,
}

impl ModelPaths {
    /// Layout under `root` without touching the filesystem
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            checkpoints: root.join("checkpoints"),
            logs: root.join("logs"),
            plots: root.join("training"),
            model_no_ft: root.join("model_no_ft"),
            model: root.join("model"),
            root,
        }
    }

    /// Create the output tree; `root` must not exist yet
    pub fn prepare<P: AsRef<Path>>(root: P) -> Result<Self> {
        let paths = Self::new(root);
        if paths.root.exists() {
            return Err(TrainError::OutputExists(paths.root));
        }

        std::fs::create_dir_all(&paths.root)?;
        for dir in [&paths.checkpoints, &paths.logs, &paths.plots] {
            std::fs::create_dir(dir)?;
        }
        Ok(paths)
    }

    pub fn epoch_log(&self) -> PathBuf {
        self.logs.join("epochs.jsonl")
    }

    pub fn history(&self) -> PathBuf {
        self.logs.join("history.json")
    }

    pub fn config(&self) -> PathBuf {
        self.logs.join("config.json")
    }
}

/// Histories of both phases
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    pub classifier: History,
    pub fine_tune: History,
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub paths: ModelPaths,
    pub class_names: Vec<String>,
    pub class_weights: Option<Vec<f32>>,
    pub history: RunHistory,
    pub plots: Vec<PathBuf>,
    /// Final model on the validation split
    pub confusion_matrix: ConfusionMatrix,
}

/// Train on `<data_dir>/train`, validate on `<data_dir>/validation` and write
/// everything into `model_dir`, which must not exist.
pub fn run_training<B: AutodiffBackend>(
    data_dir: &Path,
    model_dir: &Path,
    config: &TrainingConfig,
    backbone_weights: Option<&Path>,
    device: B::Device,
) -> Result<TrainingSummary> {
    config.validate()?;
    let paths = ModelPaths::prepare(model_dir)?;
    config.save(&paths.config())?;

    // Input pipeline
    println!("{}", "Loading Dataset...".cyan());
    let train_folder = ImageFolder::new(data_dir.join(TRAIN_DIR))?;
    let val_folder = ImageFolder::new(data_dir.join(VALIDATION_DIR))?;
    train_folder.ensure_same_classes(&val_folder)?;
    let positive_class = train_folder.require_class(&config.positive_class)?;

    train_folder.stats().print("Training split");
    val_folder.stats().print("Validation split");

    let class_weights = if config.class_weights {
        let weights = compute_class_weights(&train_folder.class_counts())?;
        for (name, weight) in train_folder.class_names.iter().zip(&weights) {
            info!("Class weight '{}': {:.4}", name, weight);
        }
        Some(weights)
    } else {
        None
    };

    let train = XrayDataset::from_folder(&train_folder, config.image_size);
    let validation = XrayDataset::from_folder(&val_folder, config.image_size);

    // Model
    println!("{}", "Creating Model...".cyan());
    let model = config.classifier(train_folder.num_classes()).init::<B>(&device);
    let model = match backbone_weights {
        Some(path) => {
            info!("Loading backbone weights from {}", path.display());
            model.load_backbone(path, &device)?
        }
        None => {
            warn!("No backbone weights given; the backbone starts from random initialisation");
            model
        }
    };

    let mut trainer = Trainer::new(model, device, config, positive_class, class_weights.clone())
        .with_checkpoints(EpochCheckpointer::new(&paths.checkpoints))
        .with_epoch_log(EpochLog::open(paths.epoch_log())?);

    // Classifier phase, then fine-tuning from the next epoch
    println!("{}", "Training Classifier...".green().bold());
    let history = trainer.fit_classifier(config.learning_rate, &train, &validation, config.epochs, 0)?;
    trainer.save_weights(&paths.model_no_ft)?;

    let initial_epoch = history.last_epoch().map_or(0, |epoch| epoch + 1);
    println!("{}", "Fine-tuning...".green().bold());
    let history_ft = trainer.fine_tune(
        config.learning_rate_ft,
        &train,
        &validation,
        config.epochs_ft,
        initial_epoch,
        config.fine_tune_at,
    )?;
    trainer.save_weights(&paths.model)?;

    let history = RunHistory {
        classifier: history,
        fine_tune: history_ft,
    };
    history.classifier.concat(&history.fine_tune).save_json(&paths.history())?;

    let plots = plot_learning_curves(&history.classifier, &history.fine_tune, &paths.plots)?;

    let confusion_matrix = trainer.confusion_matrix(&validation)?;
    info!("Validation results\n{}", confusion_matrix.display(&train_folder.class_names));

    println!("{}", "Training Complete!".green().bold());
    println!("  💾 Model: {}.mpk", paths.model.display());
    println!("  📈 Learning curves: {}", paths.plots.display());

    Ok(TrainingSummary {
        paths,
        class_names: train_folder.class_names,
        class_weights,
        history,
        plots,
        confusion_matrix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("runs").join("first");

        let paths = ModelPaths::prepare(&root).unwrap();

        assert!(paths.checkpoints.is_dir());
        assert!(paths.logs.is_dir());
        assert!(paths.plots.is_dir());
        assert_eq!(paths.plots, root.join("training"));
        assert_eq!(paths.epoch_log(), root.join("logs").join("epochs.jsonl"));
    }

    #[test]
    fn test_prepare_refuses_existing_directory() {
        let dir = tempfile::tempdir().unwrap();

        let err = ModelPaths::prepare(dir.path()).unwrap_err();

        assert!(matches!(err, TrainError::OutputExists(_)));
        assert!(!dir.path().join("checkpoints").exists());
    }
}
