//! # Grape Leaf Disease Classifier
//!
//! Transfer-learning classifier for grape leaf diseases built on the Burn framework.
//! A frozen MobileNetV2 feature extractor is composed with a small trainable head
//! that maps pooled features to four classes: healthy, leaf blight, esca and black rot.
//!
//! ## Modules
//!
//! - `dataset`: class ordering, directory loading, preprocessing, augmentation and batching
//! - `model`: MobileNetV2 backbone, classifier head and the persisted artifact format
//! - `training`: the transfer-learning trainer and its configuration
//! - `inference`: load-once inference engine, decision layer and diagnosis service
//! - `knowledge`: the static disease information table
//! - `utils`: errors, logging and evaluation metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use grape_leaf_disease::backend::{default_device, InferenceBackend};
//! use grape_leaf_disease::inference::{Diagnoser, SharedEngine};
//!
//! let engine = SharedEngine::<InferenceBackend>::new("output/grape_leaf_classifier", default_device());
//! let diagnoser = Diagnoser::new(engine);
//! let diagnosis = diagnoser.diagnose_upload(&std::fs::read("leaf.jpg")?)?;
//! println!("{} ({:.1}%)", diagnosis.record.name, diagnosis.prediction.confidence * 100.0);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod knowledge;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{DiseaseClass, ImageTensor};
pub use inference::{ClassProbabilities, Diagnoser, Diagnosis, InferenceEngine, PredictionResult, SharedEngine};
pub use knowledge::{DiseaseCatalog, DiseaseRecord, StaticDiseaseCatalog};
pub use model::{GrapeLeafClassifier, GrapeLeafClassifierConfig};
pub use training::{Trainer, TrainingConfig, TrainingReport};
pub use utils::error::{GrapeLeafError, Result};

/// Number of disease classes the classifier distinguishes
pub const NUM_CLASSES: usize = 4;

/// Side length of the square model input
pub const IMAGE_SIZE: usize = 224;

/// Number of colour channels in the model input
pub const IMAGE_CHANNELS: usize = 3;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
