//! Training: loss, class weights, callbacks, history and the two-phase loop

pub mod callbacks;
pub mod class_weights;
pub mod history;
pub mod loss;
pub mod pipeline;
pub mod trainer;

pub use callbacks::{EarlyStopping, EpochCheckpointer, StopCheck};
pub use class_weights::compute_class_weights;
pub use history::{EpochLog, EpochRecord, History, Split};
pub use loss::ClassificationLoss;
pub use pipeline::{run_training, ModelPaths, RunHistory, TrainingSummary};
pub use trainer::Trainer;
