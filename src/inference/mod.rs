//! Inference module for serving predictions
//!
//! This module provides:
//! - The inference engine and its load-once shared handle
//! - The decision layer (argmax, lowest index wins ties)
//! - The diagnosis service joining predictions with disease information
//!
//! ## Serving Flow
//!
//! ```text
//! upload bytes → decode (JPEG/PNG only) → ImageTensor
//!   → SharedEngine (loads artifact on first use) → ClassProbabilities
//!   → decide → PredictionResult → + DiseaseRecord → Diagnosis
//! ```

pub mod decision;
pub mod diagnose;
pub mod engine;

// Re-export main types for convenience
pub use decision::{decide, PredictionResult};
pub use diagnose::{Diagnoser, Diagnosis};
pub use engine::{ClassProbabilities, InferenceEngine, SharedEngine};
