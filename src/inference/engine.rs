//! Inference engine and the process-wide model cache
//!
//! [`InferenceEngine`] owns one loaded classifier and maps an
//! [`ImageTensor`] to a probability distribution. [`SharedEngine`] wraps it in
//! load-once state: the first caller loads the artifact, every later caller
//! reuses the same read-only model. A failed load is not cached, so a fixed
//! artifact is picked up by the next call.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{DiseaseClass, ImageTensor};
use crate::model::{load_artifact, GrapeLeafClassifier, GrapeLeafClassifierConfig};
use crate::utils::error::{GrapeLeafError, Result};
use crate::NUM_CLASSES;

/// Probability per class, indexed by class ordinal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities([f32; NUM_CLASSES]);

impl ClassProbabilities {
    pub fn new(values: [f32; NUM_CLASSES]) -> Self {
        Self(values)
    }

    /// Build from model output; fails unless there is one value per class
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        let values: [f32; NUM_CLASSES] = values.try_into().map_err(|_| {
            GrapeLeafError::Inference(format!(
                "expected {} probabilities, got {}",
                NUM_CLASSES,
                values.len()
            ))
        })?;
        Ok(Self(values))
    }

    pub fn get(&self, class: DiseaseClass) -> f32 {
        self.0[class.index()]
    }

    pub fn as_array(&self) -> &[f32; NUM_CLASSES] {
        &self.0
    }

    /// `(class, probability)` pairs in class order
    pub fn iter(&self) -> impl Iterator<Item = (DiseaseClass, f32)> + '_ {
        DiseaseClass::ALL.iter().map(move |&class| (class, self.get(class)))
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }
}

impl fmt::Display for ClassProbabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (class, probability) in self.iter() {
            writeln!(f, "  {:12} {:6.2}%", class.id(), probability * 100.0)?;
        }
        Ok(())
    }
}

/// A loaded classifier ready to serve predictions
pub struct InferenceEngine<B: Backend> {
    model: GrapeLeafClassifier<B>,
    config: GrapeLeafClassifierConfig,
    artifact_path: PathBuf,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// Load an artifact written by the trainer
    pub fn load(artifact_path: &Path, device: &B::Device) -> Result<Self> {
        let start = Instant::now();
        let (model, config) = load_artifact::<B>(artifact_path, device)?;
        info!(
            "Inference engine ready in {:.2}s ({:?})",
            start.elapsed().as_secs_f64(),
            artifact_path
        );

        Ok(Self {
            model,
            config,
            artifact_path: artifact_path.to_path_buf(),
            device: device.clone(),
        })
    }

    /// Probability distribution over the four classes for one image
    ///
    /// Deterministic: the same tensor always yields the same values.
    pub fn predict(&self, image: &ImageTensor) -> Result<ClassProbabilities> {
        let input = image.to_batch::<B>(&self.device);
        let values = self
            .model
            .forward_probabilities(input)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| GrapeLeafError::Inference(format!("{:?}", e)))?;

        ClassProbabilities::from_slice(&values)
    }

    pub fn config(&self) -> &GrapeLeafClassifierConfig {
        &self.config
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }
}

/// Load-once handle to an [`InferenceEngine`]
///
/// The model itself is shared without locking; only the first load is
/// serialized so concurrent first callers do not load twice.
pub struct SharedEngine<B: Backend> {
    artifact_path: PathBuf,
    device: B::Device,
    engine: OnceLock<Arc<InferenceEngine<B>>>,
    init_lock: Mutex<()>,
}

impl<B: Backend> SharedEngine<B> {
    /// Create an unloaded handle; nothing is read until the first call
    pub fn new(artifact_path: impl Into<PathBuf>, device: B::Device) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            device,
            engine: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// The loaded engine, loading it on first use
    pub fn get(&self) -> Result<Arc<InferenceEngine<B>>> {
        if let Some(engine) = self.engine.get() {
            return Ok(Arc::clone(engine));
        }

        // The guarded value is (), so a poisoned lock carries no broken state
        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(engine) = self.engine.get() {
            return Ok(Arc::clone(engine));
        }

        debug!("Loading model for first inference");
        let engine = Arc::new(InferenceEngine::load(&self.artifact_path, &self.device)?);
        let _ = self.engine.set(Arc::clone(&engine));
        Ok(engine)
    }

    /// Predict with the shared model
    pub fn predict(&self, image: &ImageTensor) -> Result<ClassProbabilities> {
        self.get()?.predict(image)
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.get().is_some()
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, InferenceBackend};
    use crate::dataset::preprocess_image;
    use crate::model::{save_artifact, MobileNetV2Config};
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = InferenceBackend;

    fn write_small_artifact(dir: &Path) -> PathBuf {
        let config = GrapeLeafClassifierConfig::new()
            .with_backbone(MobileNetV2Config::new().with_width_multiplier(0.25))
            .with_hidden_units(8);
        let model = config.init::<TestBackend>(&default_device());
        save_artifact(&model, &config, &dir.join("model")).unwrap()
    }

    fn leaf_tensor() -> ImageTensor {
        let img = RgbImage::from_pixel(64, 48, Rgb([40, 160, 60]));
        preprocess_image(&DynamicImage::ImageRgb8(img))
    }

    #[test]
    fn test_from_slice_requires_four_values() {
        assert!(ClassProbabilities::from_slice(&[0.5, 0.5]).is_err());
        let probs = ClassProbabilities::from_slice(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(probs.get(DiseaseClass::BlackRot), 0.4);
    }

    #[test]
    fn test_predict_is_a_deterministic_distribution() {
        let tmp = TempDir::new().unwrap();
        let file = write_small_artifact(tmp.path());
        let engine = InferenceEngine::<TestBackend>::load(&file, &default_device()).unwrap();

        let tensor = leaf_tensor();
        let first = engine.predict(&tensor).unwrap();
        let second = engine.predict(&tensor).unwrap();

        assert!(first.as_array().iter().all(|&p| p >= 0.0));
        assert!((first.sum() - 1.0).abs() < 1e-5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_shared_engine_loads_once() {
        let tmp = TempDir::new().unwrap();
        let file = write_small_artifact(tmp.path());
        let shared = SharedEngine::<TestBackend>::new(file, default_device());
        assert!(!shared.is_loaded());

        let first = shared.get().unwrap();
        let second = shared.get().unwrap();
        assert!(shared.is_loaded());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_first_callers_share_one_load() {
        let tmp = TempDir::new().unwrap();
        let file = write_small_artifact(tmp.path());
        let shared = Arc::new(SharedEngine::<TestBackend>::new(file, default_device()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.get().map_err(|e| e.to_string()))
            })
            .collect();

        let engines: Vec<Arc<InferenceEngine<TestBackend>>> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();

        assert!(shared.is_loaded());
        let cached = shared.get().unwrap();
        for engine in &engines {
            assert!(Arc::ptr_eq(engine, &cached));
        }
    }

    #[test]
    fn test_shared_engine_does_not_cache_failures() {
        let tmp = TempDir::new().unwrap();
        let shared = SharedEngine::<TestBackend>::new(tmp.path().join("model"), default_device());

        let err = shared.get().err().unwrap();
        assert!(matches!(err, GrapeLeafError::ArtifactLoad(_, _)));
        assert!(!shared.is_loaded());

        write_small_artifact(tmp.path());
        assert!(shared.get().is_ok());
    }
}
