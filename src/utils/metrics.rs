//! Metrics Module for Model Evaluation
//!
//! Accuracy, per-class precision/recall/F1 and a confusion matrix over the
//! four disease classes. Per-class numbers make class imbalance in the
//! validation set visible where a single accuracy figure would hide it.

use serde::{Deserialize, Serialize};

use crate::dataset::DiseaseClass;
use crate::NUM_CLASSES;

/// Evaluation metrics for one pass over a labelled set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// Macro-averaged F1 over classes that have support
    pub macro_f1: f64,

    /// Per-class metrics, in class index order
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Build metrics from predicted and actual class indices
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize]) -> Self {
        let total_samples = predictions.len().min(ground_truth.len());
        if total_samples == 0 {
            return Self::default();
        }

        let confusion_matrix = ConfusionMatrix::from_predictions(predictions, ground_truth);
        let correct_predictions = confusion_matrix.correct();

        let per_class: Vec<ClassMetrics> = DiseaseClass::ALL
            .iter()
            .map(|&class| ClassMetrics::from_confusion_matrix(&confusion_matrix, class))
            .collect();

        let supported: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
        let macro_f1 = if supported.is_empty() {
            0.0
        } else {
            supported.iter().map(|m| m.f1).sum::<f64>() / supported.len() as f64
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy: correct_predictions as f64 / total_samples as f64,
            macro_f1,
            per_class,
            confusion_matrix,
        }
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Accuracy: {:.2}% ({}/{}) | Macro F1: {:.2}%",
            self.accuracy * 100.0,
            self.correct_predictions,
            self.total_samples,
            self.macro_f1 * 100.0
        )?;
        for m in &self.per_class {
            writeln!(
                f,
                "  {:12} precision {:6.2}%  recall {:6.2}%  f1 {:6.2}%  support {}",
                m.class.id(),
                m.precision * 100.0,
                m.recall * 100.0,
                m.f1 * 100.0,
                m.support
            )?;
        }
        Ok(())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: DiseaseClass,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// Precision = TP / (TP + FP)
    pub precision: f64,
    /// Recall = TP / (TP + FN)
    pub recall: f64,
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from a confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class: DiseaseClass) -> Self {
        let idx = class.index();
        let true_positives = cm.get(idx, idx);

        // Predicted as this class but actually another one
        let false_positives: usize = (0..NUM_CLASSES)
            .filter(|&i| i != idx)
            .map(|i| cm.get(i, idx))
            .sum();

        // Actually this class but predicted as another one
        let false_negatives: usize = (0..NUM_CLASSES)
            .filter(|&i| i != idx)
            .map(|i| cm.get(idx, i))
            .sum();

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Confusion matrix (row = actual, column = predicted)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub matrix: [[usize; NUM_CLASSES]; NUM_CLASSES],
}

impl ConfusionMatrix {
    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize]) -> Self {
        let mut cm = Self::default();
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }
        cm
    }

    /// Add a single prediction; out-of-range indices are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < NUM_CLASSES && predicted < NUM_CLASSES {
            self.matrix[actual][predicted] += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.matrix
            .get(actual)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..NUM_CLASSES).map(|i| self.matrix[i][i]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }
}
