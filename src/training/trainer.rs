//! Two-phase training loop
//!
//! [`Trainer::fit_classifier`] trains the dense head with the whole backbone
//! frozen. [`Trainer::fine_tune`] then unfreezes the backbone from a given
//! unit onwards and continues with a lower learning rate. Each phase gets a
//! fresh Adam optimizer and its own early-stopping state; epoch numbering
//! continues across phases so checkpoints and logs line up.

use std::path::Path;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{activation::softmax, backend::AutodiffBackend, ElementConversion, Tensor},
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::dataset::{XrayBatch, XrayBatcher, XrayDataset, XrayItem};
use crate::model::{CovidClassifier, Phase, TrainingConfig};
use crate::training::callbacks::{EarlyStopping, EpochCheckpointer, StopCheck};
use crate::training::history::{EpochLog, EpochRecord, History};
use crate::training::loss::ClassificationLoss;
use crate::utils::error::{Result, TrainError};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{ConfusionMatrix, EpochMetrics, MetricAccumulator};

/// Keras' Adam epsilon; Burn's default is larger
const ADAM_EPSILON: f32 = 1e-7;

/// Owns the model and runs both training phases
pub struct Trainer<B: AutodiffBackend> {
    model: CovidClassifier<B>,
    device: B::Device,
    batcher: XrayBatcher,
    loss: ClassificationLoss,
    batch_size: usize,
    patience: usize,
    positive_class: usize,
    rng: ChaCha8Rng,
    checkpointer: Option<EpochCheckpointer>,
    epoch_log: Option<EpochLog>,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// `positive_class` is the label whose precision and recall are reported
    pub fn new(
        model: CovidClassifier<B>,
        device: B::Device,
        config: &TrainingConfig,
        positive_class: usize,
        class_weights: Option<Vec<f32>>,
    ) -> Self {
        Self {
            model,
            device,
            batcher: XrayBatcher::new(config.image_size),
            loss: ClassificationLoss::new(class_weights),
            batch_size: config.batch_size.max(1),
            patience: config.early_stopping_patience,
            positive_class,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            checkpointer: None,
            epoch_log: None,
        }
    }

    /// Save weights after every epoch
    pub fn with_checkpoints(mut self, checkpointer: EpochCheckpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Append every epoch's record to a JSON-lines log
    pub fn with_epoch_log(mut self, epoch_log: EpochLog) -> Self {
        self.epoch_log = Some(epoch_log);
        self
    }

    /// Train the head only, for epochs `initial_epoch..initial_epoch + epochs`
    pub fn fit_classifier(
        &mut self,
        learning_rate: f64,
        train: &XrayDataset,
        validation: &XrayDataset,
        epochs: usize,
        initial_epoch: usize,
    ) -> Result<History> {
        self.run_phase(Phase::Classifier, learning_rate, train, validation, epochs, initial_epoch)
    }

    /// Train backbone units `fine_tune_at..` together with the head
    pub fn fine_tune(
        &mut self,
        learning_rate: f64,
        train: &XrayDataset,
        validation: &XrayDataset,
        epochs: usize,
        initial_epoch: usize,
        fine_tune_at: usize,
    ) -> Result<History> {
        self.run_phase(
            Phase::FineTune { fine_tune_at },
            learning_rate,
            train,
            validation,
            epochs,
            initial_epoch,
        )
    }

    /// Write the current weights with the compact recorder (`<path>.mpk`)
    pub fn save_weights(&self, path: &Path) -> Result<()> {
        self.model
            .clone()
            .save_file(path.to_path_buf(), &CompactRecorder::new())?;
        info!("Saved weights to {}.mpk", path.display());
        Ok(())
    }

    fn run_phase(
        &mut self,
        phase: Phase,
        learning_rate: f64,
        train: &XrayDataset,
        validation: &XrayDataset,
        epochs: usize,
        initial_epoch: usize,
    ) -> Result<History> {
        if train.is_empty() {
            return Err(TrainError::Dataset("Training split has no images".to_string()));
        }

        info!(
            "Phase '{}': epochs {}..{}, lr {:e}, first trainable unit {}",
            phase,
            initial_epoch + 1,
            initial_epoch + epochs,
            learning_rate,
            phase.first_trainable_unit()
        );

        let mut optimizer = AdamConfig::new()
            .with_epsilon(ADAM_EPSILON)
            .init::<B, CovidClassifier<B>>();
        let mut stopper = EarlyStopping::new(self.patience);
        let mut best_model: Option<CovidClassifier<B>> = None;
        let mut history = History::new();
        let mut logger = TrainingLogger::new(phase.name(), initial_epoch, initial_epoch + epochs);

        for epoch in initial_epoch..initial_epoch + epochs {
            logger.start_epoch(epoch);

            let train_metrics = self.train_epoch(&mut optimizer, phase, learning_rate, train)?;
            let val_metrics = self.evaluate(validation)?;

            let record = EpochRecord::new(epoch, phase.name(), learning_rate, train_metrics, val_metrics);
            logger.end_epoch(&record);

            if let Some(checkpointer) = &self.checkpointer {
                checkpointer.save(&self.model, epoch)?;
            }
            if let Some(epoch_log) = &mut self.epoch_log {
                epoch_log.append(&record)?;
            }
            history.push(record);

            match stopper.update(epoch, train_metrics.loss) {
                StopCheck::Improved => best_model = Some(self.model.clone()),
                StopCheck::Waiting => {}
                StopCheck::Stop { best_epoch } => {
                    logger.log_early_stop(epoch, best_epoch);
                    if let Some(best) = best_model.take() {
                        self.model = best;
                    }
                    break;
                }
            }
        }

        logger.log_complete(history.len());
        Ok(history)
    }

    fn train_epoch<O>(
        &mut self,
        optimizer: &mut O,
        phase: Phase,
        learning_rate: f64,
        dataset: &XrayDataset,
    ) -> Result<EpochMetrics>
    where
        O: Optimizer<CovidClassifier<B>, B>,
    {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        indices.shuffle(&mut self.rng);

        let num_batches = indices.len().div_ceil(self.batch_size);
        let progress = batch_progress(num_batches);
        let mut metrics = MetricAccumulator::new(self.model.num_classes(), self.positive_class);

        for batch_indices in indices.chunks(self.batch_size) {
            let items = load_items(dataset, batch_indices)?;
            let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
            let batch: XrayBatch<B> = self.batcher.batch(items, &self.device);

            let logits = self.model.forward_train(batch.images, phase);
            let loss = self.loss.forward(logits.clone(), batch.targets);
            let loss_value: f64 = loss.clone().into_scalar().elem();

            metrics.update(&probabilities(logits.inner())?, &labels, loss_value);

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = optimizer.step(learning_rate, self.model.clone(), grads);

            progress.inc(1);
            progress.set_message(format!(
                "loss {:.4} acc {:.4}",
                metrics.mean_loss(),
                metrics.accuracy()
            ));
        }
        progress.finish_and_clear();

        Ok(metrics.compute())
    }

    /// Metrics of the current model on `dataset`, in inference mode and
    /// without class weights
    pub fn evaluate(&self, dataset: &XrayDataset) -> Result<EpochMetrics> {
        Ok(self.accumulate(dataset)?.compute())
    }

    /// Argmax confusion matrix of the current model on `dataset`
    pub fn confusion_matrix(&self, dataset: &XrayDataset) -> Result<ConfusionMatrix> {
        Ok(self.accumulate(dataset)?.confusion_matrix())
    }

    fn accumulate(&self, dataset: &XrayDataset) -> Result<MetricAccumulator> {
        let model = self.model.valid();
        let mut metrics = MetricAccumulator::new(model.num_classes(), self.positive_class);

        let indices: Vec<usize> = (0..dataset.len()).collect();
        for batch_indices in indices.chunks(self.batch_size) {
            let items = load_items(dataset, batch_indices)?;
            let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
            let batch: XrayBatch<B::InnerBackend> = self.batcher.batch(items, &self.device);

            let logits = model.forward(batch.images);
            let loss: f64 = self
                .loss
                .unweighted(logits.clone(), batch.targets)
                .into_scalar()
                .elem();

            metrics.update(&probabilities(logits)?, &labels, loss);
        }

        debug!("Evaluated {} samples", metrics.len());
        Ok(metrics)
    }
}

/// Decode one batch of images in parallel
fn load_items(dataset: &XrayDataset, indices: &[usize]) -> Result<Vec<XrayItem>> {
    indices.par_iter().map(|&i| dataset.load(i)).collect()
}

/// Softmax of `logits` as a row-major `Vec<f32>`
fn probabilities<B: burn::tensor::backend::Backend>(logits: Tensor<B, 2>) -> Result<Vec<f32>> {
    softmax(logits, 1)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TrainError::Training(format!("Failed to read probabilities: {:?}", e)))
}

fn batch_progress(num_batches: usize) -> ProgressBar {
    let progress = ProgressBar::new(num_batches as u64);
    let style = ProgressStyle::default_bar()
        .template("  [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches {msg}")
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress
}
