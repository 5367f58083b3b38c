//! COVIDx classifier training CLI

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

use covidx_train::backend::{backend_name, default_device, TrainingBackend};
use covidx_train::utils::logging::{init_logging, LogConfig};
use covidx_train::{run_training, TrainingConfig};

/// Train a COVID-19 chest X-ray classifier on the COVIDx dataset.
///
/// The classifier head is trained first with the ResNet50 backbone frozen,
/// then the upper backbone blocks are fine-tuned.
#[derive(Parser, Debug)]
#[command(name = "covidx-train")]
#[command(version)]
#[command(about = "Train classifier on COVIDx dataset", long_about = None)]
struct Cli {
    /// Path to COVIDx dataset (with `train/` and `validation/` subdirectories)
    data: PathBuf,

    /// Path where to save the trained model and the logs. Must be a non-existing directory.
    model: PathBuf,

    /// Use class weights to compensate the dataset imbalance
    #[arg(long, default_value = "false")]
    class_weights: bool,

    /// JSON file with training hyperparameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Epochs for the classifier phase
    #[arg(long)]
    epochs: Option<usize>,

    /// Epochs for fine-tuning
    #[arg(long)]
    epochs_ft: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Pretrained ResNet50 backbone weights (Burn named MessagePack record)
    #[arg(long)]
    backbone_weights: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    /// File config (or defaults) with command-line overrides applied
    fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?,
            None => TrainingConfig::default(),
        };

        if self.class_weights {
            config.class_weights = true;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(epochs_ft) = self.epochs_ft {
            config.epochs_ft = epochs_ft;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    let config = cli.training_config()?;
    info!("Backend: {}", backend_name());
    info!("Configuration: {:?}", config);

    let summary = run_training::<TrainingBackend>(
        &cli.data,
        &cli.model,
        &config,
        cli.backbone_weights.as_deref(),
        default_device(),
    )?;

    println!();
    println!("{}", "Run summary:".cyan().bold());
    println!("  🏷️  Classes: {}", summary.class_names.join(", "));
    if let Some(weights) = &summary.class_weights {
        println!("  ⚖️  Class weights: {:?}", weights);
    }
    println!(
        "  🔄 Epochs: {} classifier + {} fine-tuning",
        summary.history.classifier.len(),
        summary.history.fine_tune.len()
    );
    if let Some(last) = summary.history.fine_tune.records.last() {
        println!(
            "  ✅ Final validation: acc {:.4} auc {:.4} f1 {:.4} covid precision {:.4} recall {:.4}",
            last.validation.accuracy,
            last.validation.auc,
            last.validation.f1_score,
            last.validation.precision_covid19,
            last.validation.recall_covid19
        );
    }
    println!("  📁 Output: {}", summary.paths.root.display());

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║   🩻 COVIDx Classifier Training                              ║
 ║   ResNet50 transfer learning with Burn + Rust                ║
 ╚══════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}
