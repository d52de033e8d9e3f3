//! Training Configuration
//!
//! Hyperparameters for one training run. Stored as JSON so a run can be
//! repeated exactly (`--config` on the command line).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::AugmentationConfig;
use crate::model::GrapeLeafClassifierConfig;
use crate::utils::error::{GrapeLeafError, Result};

/// Configuration for training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,

    /// Batch size for training and validation
    pub batch_size: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Seed for shuffling and augmentation; `None` draws from OS entropy
    pub seed: Option<u64>,

    /// Training-time augmentation
    pub augmentation: AugmentationConfig,

    /// Backbone and head architecture
    pub model: GrapeLeafClassifierConfig,

    /// Torchvision `mobilenet_v2` state dict with ImageNet weights
    pub backbone_weights: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: super::DEFAULT_EPOCHS,
            batch_size: super::DEFAULT_BATCH_SIZE,
            learning_rate: super::DEFAULT_LEARNING_RATE,
            seed: None,
            augmentation: AugmentationConfig::default(),
            model: GrapeLeafClassifierConfig::new(),
            backbone_weights: None,
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.epochs == 0 {
            return Err("epochs must be > 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            ));
        }
        if self.model.hidden_units == 0 {
            return Err("model.hidden_units must be > 0".to_string());
        }
        if self.model.num_classes != crate::NUM_CLASSES {
            return Err(format!(
                "model.num_classes must be {}, got {}",
                crate::NUM_CLASSES,
                self.model.num_classes
            ));
        }
        if self.model.backbone.width_multiplier <= 0.0 {
            return Err("model.backbone.width_multiplier must be > 0".to_string());
        }
        self.augmentation.validate()
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate().map_err(GrapeLeafError::Config)?;
        Ok(config)
    }
}
