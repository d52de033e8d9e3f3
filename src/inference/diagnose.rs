//! Diagnosis service
//!
//! Upload bytes in, prediction plus disease information out. The upload is
//! decoded and preprocessed before the engine is asked for anything, so a bad
//! upload is rejected without loading the model.

use burn::tensor::backend::Backend;
use serde::Serialize;

use crate::dataset::{preprocess_upload, ImageTensor};
use crate::inference::decision::{decide, PredictionResult};
use crate::inference::engine::SharedEngine;
use crate::knowledge::{DiseaseCatalog, DiseaseRecord, StaticDiseaseCatalog};
use crate::utils::error::Result;

/// Prediction joined with the matching disease record
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub prediction: PredictionResult,
    pub record: DiseaseRecord,
}

/// Shared engine + decision layer + disease catalogue
pub struct Diagnoser<B: Backend, C: DiseaseCatalog = StaticDiseaseCatalog> {
    engine: SharedEngine<B>,
    catalog: C,
}

impl<B: Backend> Diagnoser<B, StaticDiseaseCatalog> {
    /// Diagnoser with the built-in disease table
    pub fn new(engine: SharedEngine<B>) -> Self {
        Self::with_catalog(engine, StaticDiseaseCatalog::new())
    }
}

impl<B: Backend, C: DiseaseCatalog> Diagnoser<B, C> {
    pub fn with_catalog(engine: SharedEngine<B>, catalog: C) -> Self {
        Self { engine, catalog }
    }

    pub fn engine(&self) -> &SharedEngine<B> {
        &self.engine
    }

    /// Diagnose a JPEG or PNG upload
    pub fn diagnose_upload(&self, bytes: &[u8]) -> Result<Diagnosis> {
        let tensor = preprocess_upload(bytes)?;
        self.diagnose(&tensor)
    }

    /// Diagnose an already preprocessed image
    pub fn diagnose(&self, image: &ImageTensor) -> Result<Diagnosis> {
        let probabilities = self.engine.predict(image)?;
        let prediction = decide(&probabilities);
        Ok(self.describe(prediction))
    }

    /// Attach the catalogue entry for a prediction
    pub fn describe(&self, prediction: PredictionResult) -> Diagnosis {
        let record = self.catalog.record(prediction.predicted_class).clone();
        Diagnosis { prediction, record }
    }
}
