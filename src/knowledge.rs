//! Disease information shown alongside a prediction
//!
//! The catalogue is read-only and keyed by [`DiseaseClass`]. The built-in
//! table targets Indian vineyard conditions; a different table can be
//! supplied through the [`DiseaseCatalog`] trait.

use serde::{Deserialize, Serialize};

use crate::dataset::DiseaseClass;
use crate::NUM_CLASSES;

/// User-facing information for one class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseRecord {
    /// Display name
    pub name: String,
    pub description: String,
    pub treatment: String,
    pub prevention: String,
}

impl DiseaseRecord {
    fn new(name: &str, description: &str, treatment: &str, prevention: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            treatment: treatment.to_string(),
            prevention: prevention.to_string(),
        }
    }
}

/// Source of disease records
pub trait DiseaseCatalog: Send + Sync {
    fn record(&self, class: DiseaseClass) -> &DiseaseRecord;
}

/// The built-in disease table
#[derive(Debug, Clone)]
pub struct StaticDiseaseCatalog {
    records: [DiseaseRecord; NUM_CLASSES],
}

impl Default for StaticDiseaseCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticDiseaseCatalog {
    pub fn new() -> Self {
        Self {
            records: [
                DiseaseRecord::new(
                    "Healthy Grape",
                    "The grape plant shows normal growth with healthy green leaves and proper fruit development.",
                    "No treatment needed. Continue regular maintenance practices.",
                    "Maintain proper spacing (2-3m), regular pruning, balanced fertilization (NPK 19:19:19), and proper irrigation.",
                ),
                DiseaseRecord::new(
                    "Leaf Blight (Isariopsis Leaf Spot)",
                    "A fungal disease common in Indian vineyards, especially during monsoon season (June-September). Characterized by brown spots with yellow halos on leaves.",
                    "Apply fungicides: Mancozeb (2g/l) or Copper oxychloride (3g/l) at 15-day intervals. Remove infected leaves.",
                    "Ensure proper drainage, maintain plant spacing, avoid overhead irrigation, and remove fallen leaves.",
                ),
                DiseaseRecord::new(
                    "Esca (Black Measles)",
                    "A serious fungal disease affecting older grapevines in India. Shows as dark spots on leaves and berries, with internal wood decay.",
                    "Prune affected parts and apply systemic fungicides like Tebuconazole (1ml/l). Remove and destroy infected plants.",
                    "Use disease-free planting material, maintain proper vineyard hygiene, and avoid wounding during pruning.",
                ),
                DiseaseRecord::new(
                    "Black Rot",
                    "A fungal disease prevalent in humid Indian conditions. Causes circular brown spots on leaves and black, shriveled berries.",
                    "Apply fungicides: Mancozeb (2g/l) or Carbendazim (1g/l) at 10-day intervals. Remove infected berries.",
                    "Remove infected berries, maintain proper canopy management, ensure good air circulation, and avoid overhead irrigation.",
                ),
            ],
        }
    }
}

impl DiseaseCatalog for StaticDiseaseCatalog {
    fn record(&self, class: DiseaseClass) -> &DiseaseRecord {
        &self.records[class.index()]
    }
}
