//! Model module for the grape leaf classifier using the Burn framework
//!
//! This module provides:
//! - A MobileNetV2 feature extractor with torchvision-compatible weight import
//! - The trainable classifier head
//! - The composed classifier and its artifact format
//!
//! ## Architecture
//!
//! ```text
//! image [B, 3, 224, 224] in [0, 1]
//!   → ImageNet normalization
//!   → MobileNetV2 trunk (frozen)      [B, 1280, 7, 7]
//!   → global average pool             [B, 1280]
//!   → Dense(1024) + ReLU
//!   → Dense(4)                        logits, softmax for probabilities
//! ```

pub mod artifact;
pub mod classifier;
pub mod head;
pub mod mobilenet;

// Re-export main types for convenience
pub use artifact::{artifact_file, load_artifact, save_artifact, ModelArtifactRecord};
pub use classifier::{GrapeLeafClassifier, GrapeLeafClassifierConfig};
pub use head::{ClassifierHead, ClassifierHeadConfig};
pub use mobilenet::{load_pretrained, MobileNetV2, MobileNetV2Config};
