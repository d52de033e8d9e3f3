//! Logging Module
//!
//! Structured logging through the `tracing` crate, plus a small helper that
//! reports per-epoch training progress.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::training::EpochMetrics;
use crate::utils::error::{GrapeLeafError, Result};
use crate::utils::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose logging for debugging
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Parse a level name ("trace", "debug", "info", "warn", "error")
    pub fn with_level_name(mut self, name: &str) -> Self {
        self.level = match name.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        self
    }
}

/// Install the global tracing subscriber
///
/// Fails if a global subscriber is already set (e.g. when called twice).
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| GrapeLeafError::Config(format!("Failed to initialize logging: {}", e)))
}

/// Training progress logger
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (0-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::info!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Log end of an epoch with its metrics
    pub fn end_epoch(&self, metrics: &EpochMetrics) {
        let epoch_time = self.epoch_start.elapsed();
        let total_time = self.training_start.elapsed();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch + 1);
        let avg_epoch_time = total_time.as_secs_f64() / (self.epoch + 1) as f64;
        let eta_secs = epochs_remaining as f64 * avg_epoch_time;

        tracing::info!(
            "Epoch {}/{} completed in {} | loss: {:.4} | acc: {:.2}% | val_loss: {:.4} | val_acc: {:.2}% | ETA: {}",
            self.epoch + 1,
            self.total_epochs,
            format_duration(epoch_time.as_secs_f64()),
            metrics.train_loss,
            metrics.train_accuracy * 100.0,
            metrics.val_loss,
            metrics.val_accuracy * 100.0,
            format_duration(eta_secs)
        );
    }

    /// Log training completion
    pub fn log_complete(&self, final_val_accuracy: f64) {
        tracing::info!(
            "Training complete! {} epochs in {} | final val_acc: {:.2}%",
            self.total_epochs,
            format_duration(self.training_start.elapsed().as_secs_f64()),
            final_val_accuracy * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_name_parsing() {
        assert_eq!(LogConfig::default().with_level_name("debug").level, Level::DEBUG);
        assert_eq!(LogConfig::default().with_level_name("Warning").level, Level::WARN);
        assert_eq!(LogConfig::default().with_level_name("nonsense").level, Level::INFO);
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, Level::INFO);
        assert_eq!(LogConfig::verbose().level, Level::DEBUG);
        assert_eq!(LogConfig::quiet().level, Level::ERROR);
    }
}
