//! Logging setup and training progress lines.
//!
//! Structured logging goes through `tracing`; the subscriber is a compact
//! `tracing-subscriber` fmt layer configured from [`LogConfig`].

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::training::history::EpochRecord;
use crate::utils::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug-level config with module paths
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Install the global tracing subscriber
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Per-phase epoch timing and summary lines
pub struct TrainingLogger {
    phase: String,
    first_epoch: usize,
    last_epoch: usize,
    epoch_start: Instant,
    phase_start: Instant,
}

impl TrainingLogger {
    /// Logger for epochs `first_epoch..last_epoch` (0-based, exclusive end)
    pub fn new(phase: &str, first_epoch: usize, last_epoch: usize) -> Self {
        Self {
            phase: phase.to_string(),
            first_epoch,
            last_epoch,
            epoch_start: Instant::now(),
            phase_start: Instant::now(),
        }
    }

    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch_start = Instant::now();
        tracing::info!(
            "[{}] Epoch {}/{} started",
            self.phase,
            epoch + 1,
            self.last_epoch
        );
    }

    pub fn end_epoch(&self, record: &EpochRecord) {
        let done = record.epoch + 1 - self.first_epoch;
        let remaining = self.last_epoch.saturating_sub(record.epoch + 1);
        let avg_epoch_secs = self.phase_start.elapsed().as_secs_f64() / done.max(1) as f64;

        tracing::info!(
            "[{}] Epoch {}/{} done in {} | loss {:.4} acc {:.4} auc {:.4} | val_loss {:.4} val_acc {:.4} val_auc {:.4} val_f1 {:.4} | ETA {}",
            self.phase,
            record.epoch + 1,
            self.last_epoch,
            format_duration(self.epoch_start.elapsed().as_secs_f64()),
            record.train.loss,
            record.train.accuracy,
            record.train.auc,
            record.validation.loss,
            record.validation.accuracy,
            record.validation.auc,
            record.validation.f1_score,
            format_duration(remaining as f64 * avg_epoch_secs)
        );
    }

    pub fn log_early_stop(&self, epoch: usize, best_epoch: Option<usize>) {
        match best_epoch {
            Some(best) => tracing::warn!(
                "[{}] Early stopping at epoch {}; restoring weights from epoch {}",
                self.phase,
                epoch + 1,
                best + 1
            ),
            None => tracing::warn!(
                "[{}] Early stopping at epoch {}; loss never became finite, keeping current weights",
                self.phase,
                epoch + 1
            ),
        }
    }

    pub fn log_complete(&self, epochs_run: usize) {
        tracing::info!(
            "[{}] Finished {} epochs in {}",
            self.phase,
            epochs_run,
            format_duration(self.phase_start.elapsed().as_secs_f64())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_verbose() {
        let config = LogConfig::verbose();
        assert_eq!(config.level, LogLevel::Debug);
        assert!(config.include_target);
    }
}
