//! Model artifact persistence
//!
//! An artifact is one MessagePack file holding the weights of backbone and
//! head together with a small manifest: format version, the class names in
//! output order, the input image size and the model configuration. Loading
//! checks the manifest before touching the weights, so an artifact trained
//! with a different class ordering is rejected rather than silently
//! mislabelling predictions.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder},
    tensor::backend::Backend,
};
use tracing::{debug, info};

use crate::dataset::CLASS_NAMES;
use crate::model::classifier::{
    GrapeLeafClassifier, GrapeLeafClassifierConfig, GrapeLeafClassifierRecord,
};
use crate::utils::error::{self, GrapeLeafError};
use crate::IMAGE_SIZE;

/// Bumped whenever the artifact layout changes incompatibly
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// File extension appended by the recorder
pub const ARTIFACT_EXTENSION: &str = "mpk";

/// Everything persisted for one trained model
#[derive(Record)]
pub struct ModelArtifactRecord<B: Backend> {
    pub format_version: u32,
    pub class_names: Vec<String>,
    pub image_size: usize,
    /// `GrapeLeafClassifierConfig` as JSON
    pub config_json: String,
    pub model: GrapeLeafClassifierRecord<B>,
}

type ArtifactRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Path of the file written for an artifact path given without extension
pub fn artifact_file(path: &Path) -> PathBuf {
    path.with_extension(ARTIFACT_EXTENSION)
}

/// Persist a trained model
///
/// `path` is given without extension; the returned path is the file written.
pub fn save_artifact<B: Backend>(
    model: &GrapeLeafClassifier<B>,
    config: &GrapeLeafClassifierConfig,
    path: &Path,
) -> error::Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let record = ModelArtifactRecord {
        format_version: ARTIFACT_FORMAT_VERSION,
        class_names: CLASS_NAMES.iter().map(|name| name.to_string()).collect(),
        image_size: IMAGE_SIZE,
        config_json: serde_json::to_string(config)?,
        model: model.clone().into_record(),
    };

    ArtifactRecorder::new()
        .record(record, path.to_path_buf())
        .map_err(|e| GrapeLeafError::Serialization(format!("failed to write artifact: {}", e)))?;

    let file = artifact_file(path);
    info!("Model artifact saved to {:?}", file);
    Ok(file)
}

/// Load a model artifact written by [`save_artifact`]
///
/// Accepts the path with or without the `.mpk` extension. Every failure
/// (missing file, corrupt content, foreign class ordering, mismatched
/// architecture) is reported as an artifact load error.
pub fn load_artifact<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> error::Result<(GrapeLeafClassifier<B>, GrapeLeafClassifierConfig)> {
    let file = artifact_file(path);
    if !file.is_file() {
        return Err(GrapeLeafError::artifact(&file, "artifact file not found"));
    }

    debug!("Loading model artifact from {:?}", file);
    let record: ModelArtifactRecord<B> = ArtifactRecorder::new()
        .load(file.clone(), device)
        .map_err(|e| GrapeLeafError::artifact(&file, format!("unreadable artifact: {}", e)))?;

    let config =
        check_manifest(&record).map_err(|reason| GrapeLeafError::artifact(&file, reason))?;

    let model = config.init::<B>(device).load_record(record.model);
    model
        .check_architecture(&config)
        .map_err(|reason| GrapeLeafError::artifact(&file, reason))?;

    info!("Loaded model artifact {:?}", file);
    Ok((model, config))
}

fn check_manifest<B: Backend>(
    record: &ModelArtifactRecord<B>,
) -> std::result::Result<GrapeLeafClassifierConfig, String> {
    if record.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(format!(
            "unsupported artifact format version {} (expected {})",
            record.format_version, ARTIFACT_FORMAT_VERSION
        ));
    }

    if record.class_names != CLASS_NAMES {
        return Err(format!(
            "class ordering {:?} does not match {:?}",
            record.class_names, CLASS_NAMES
        ));
    }

    if record.image_size != IMAGE_SIZE {
        return Err(format!(
            "artifact expects {}px images, this build uses {}px",
            record.image_size, IMAGE_SIZE
        ));
    }

    let config: GrapeLeafClassifierConfig = serde_json::from_str(&record.config_json)
        .map_err(|e| format!("invalid model configuration: {}", e))?;

    if config.num_classes != CLASS_NAMES.len() {
        return Err(format!(
            "model has {} outputs for {} classes",
            config.num_classes,
            CLASS_NAMES.len()
        ));
    }

    Ok(config)
}
