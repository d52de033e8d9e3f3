//! Dataset module for grape leaf data handling
//!
//! This module provides:
//! - The fixed disease class set and its ordinal mapping
//! - Loading the directory-per-class training layout from disk
//! - Image preprocessing shared by training and inference
//! - Training-time augmentation and batch streams
//!
//! ## Class Ordering
//!
//! The ordinal of every class is fixed: `0: healthy`, `1: leaf_blight`,
//! `2: esca`, `3: black_rot`. Training enumerates classes in this order and
//! serving decodes model outputs with the same table. Artifacts store the names
//! they were trained with and are rejected on load if they disagree.

pub mod augmentation;
pub mod batcher;
pub mod loader;
pub mod pipeline;
pub mod preprocess;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// Re-export main types for convenience
pub use augmentation::{AugmentationConfig, Augmenter};
pub use batcher::{LeafBatch, LeafBatcher, LeafItem};
pub use loader::{DatasetStats, GrapeLeafDataset, ImageSample};
pub use pipeline::BatchStream;
pub use preprocess::{decode_upload, preprocess_image, preprocess_upload, ImageTensor};

/// Class identifiers in ordinal order
pub const CLASS_NAMES: [&str; 4] = ["healthy", "leaf_blight", "esca", "black_rot"];

/// PlantVillage folder names for the same classes, in ordinal order
pub const PLANTVILLAGE_DIR_NAMES: [&str; 4] = [
    "Grape___healthy",
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",
    "Grape___Esca_(Black_Measles)",
    "Grape___Black_rot",
];

/// The four grape leaf conditions the classifier distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiseaseClass {
    Healthy = 0,
    LeafBlight = 1,
    Esca = 2,
    BlackRot = 3,
}

impl DiseaseClass {
    /// All classes in ordinal order
    pub const ALL: [DiseaseClass; 4] = [
        DiseaseClass::Healthy,
        DiseaseClass::LeafBlight,
        DiseaseClass::Esca,
        DiseaseClass::BlackRot,
    ];

    /// Ordinal used as the model's output index
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Class identifier, e.g. `"leaf_blight"`
    pub fn id(self) -> &'static str {
        CLASS_NAMES[self.index()]
    }

    /// Folder name used by the PlantVillage dataset
    pub fn plantvillage_dir_name(self) -> &'static str {
        PLANTVILLAGE_DIR_NAMES[self.index()]
    }

    /// Resolve a class subdirectory name (identifier or PlantVillage folder name)
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.id() == name || c.plantvillage_dir_name() == name)
    }

    pub fn is_healthy(self) -> bool {
        self == DiseaseClass::Healthy
    }
}

impl fmt::Display for DiseaseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for DiseaseClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_dir_name(s).ok_or_else(|| format!("unknown disease class '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_ordering_is_fixed() {
        assert_eq!(DiseaseClass::from_index(0), Some(DiseaseClass::Healthy));
        assert_eq!(DiseaseClass::from_index(1), Some(DiseaseClass::LeafBlight));
        assert_eq!(DiseaseClass::from_index(2), Some(DiseaseClass::Esca));
        assert_eq!(DiseaseClass::from_index(3), Some(DiseaseClass::BlackRot));
        assert_eq!(DiseaseClass::from_index(4), None);

        for (i, class) in DiseaseClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i);
            assert_eq!(class.id(), CLASS_NAMES[i]);
        }
    }

    #[test]
    fn test_from_dir_name_accepts_both_spellings() {
        assert_eq!(DiseaseClass::from_dir_name("esca"), Some(DiseaseClass::Esca));
        assert_eq!(
            DiseaseClass::from_dir_name("Grape___Esca_(Black_Measles)"),
            Some(DiseaseClass::Esca)
        );
        assert_eq!(DiseaseClass::from_dir_name("Tomato___healthy"), None);
    }

    #[test]
    fn test_parse_and_display() {
        let class: DiseaseClass = "black_rot".parse().unwrap();
        assert_eq!(class, DiseaseClass::BlackRot);
        assert_eq!(class.to_string(), "black_rot");
        assert!("mildew".parse::<DiseaseClass>().is_err());
    }

    #[test]
    fn test_is_healthy() {
        assert!(DiseaseClass::Healthy.is_healthy());
        assert!(!DiseaseClass::LeafBlight.is_healthy());
    }
}
