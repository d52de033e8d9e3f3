//! Training module for the grape leaf classifier
//!
//! This module provides:
//! - The transfer-learning loop (frozen backbone, trainable head)
//! - Training hyperparameters
//! - Per-epoch history and the final validation report
//!
//! ## Transfer Learning Approach
//!
//! 1. Load the MobileNetV2 backbone (ImageNet weights when available)
//! 2. Keep it on the inner backend so it receives no gradients and its
//!    normalization statistics never change
//! 3. Train only the head with Adam and categorical cross-entropy
//! 4. Validate after every epoch; persist backbone + head once at the end

pub mod config;
pub mod trainer;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::DatasetStats;
use crate::utils::error::Result;
use crate::utils::metrics::Metrics;

// Re-export main types for convenience
pub use config::TrainingConfig;
pub use trainer::{evaluate, Evaluation, Trainer};

/// Default number of training epochs
pub const DEFAULT_EPOCHS: usize = 10;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// Loss and accuracy for one epoch (accuracies as fractions in [0, 1])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub duration_secs: f64,
}

/// Summary of a finished training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Artifact file that was written
    pub artifact_path: PathBuf,
    pub config: TrainingConfig,
    pub backend: String,
    /// Whether the backbone started from pretrained weights
    pub pretrained_backbone: bool,
    pub train_stats: DatasetStats,
    pub valid_stats: DatasetStats,
    pub epochs: Vec<EpochMetrics>,
    /// Validation metrics of the final model
    pub final_metrics: Metrics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TrainingReport {
    /// Validation accuracy after the last epoch
    pub fn final_val_accuracy(&self) -> f64 {
        self.final_metrics.accuracy
    }

    /// Where the history for an artifact is written: `<artifact>.history.json`
    pub fn history_path(artifact_file: &Path) -> PathBuf {
        let mut name = artifact_file
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        name.push(".history.json");
        artifact_file.with_file_name(name)
    }

    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
