//! Decision layer: turn a probability distribution into a prediction
//!
//! Plain argmax. Ties go to the lowest class index and there is no
//! confidence threshold, so a weak top-1 is still reported.

use serde::{Deserialize, Serialize};

use crate::dataset::DiseaseClass;
use crate::inference::engine::ClassProbabilities;

/// Top-1 prediction for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_class: DiseaseClass,
    /// Probability of the predicted class
    pub confidence: f32,
    pub per_class_probabilities: ClassProbabilities,
}

impl PredictionResult {
    /// Classes ordered by probability, highest first
    pub fn ranked(&self) -> Vec<(DiseaseClass, f32)> {
        let mut ranked: Vec<(DiseaseClass, f32)> = self.per_class_probabilities.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }
}

/// Pick the most probable class
pub fn decide(probabilities: &ClassProbabilities) -> PredictionResult {
    let mut best = DiseaseClass::Healthy;
    let mut confidence = probabilities.get(best);

    for (class, probability) in probabilities.iter().skip(1) {
        // Strict comparison keeps the earlier class on ties
        if probability > confidence {
            best = class;
            confidence = probability;
        }
    }

    PredictionResult {
        predicted_class: best,
        confidence,
        per_class_probabilities: *probabilities,
    }
}
