//! End-to-end checks: dataset layout → training → artifact → diagnosis

use std::io::Cursor;
use std::path::Path;

use grape_leaf_disease::backend::{default_device, InferenceBackend, TrainingBackend};
use grape_leaf_disease::dataset::{preprocess_upload, BatchStream, GrapeLeafDataset};
use grape_leaf_disease::inference::{decide, ClassProbabilities, Diagnoser, SharedEngine};
use grape_leaf_disease::model::{artifact_file, load_artifact, MobileNetV2Config};
use grape_leaf_disease::training::{evaluate, Trainer, TrainingConfig, TrainingReport};
use grape_leaf_disease::{
    DiseaseCatalog, DiseaseClass, GrapeLeafClassifierConfig, GrapeLeafError, StaticDiseaseCatalog,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

fn leaf_image(class: DiseaseClass, variant: usize) -> RgbImage {
    let base = (class.index() * 60) as u8;
    RgbImage::from_fn(48, 40, |x, y| {
        let spot = ((x as usize + variant) % 7 == 0 || (y as usize) % 9 == 0) as u8;
        Rgb([base + spot * 30, 200 - base / 2, 30 + (variant as u8) * 3])
    })
}

fn write_split(root: &Path, per_class: usize) {
    for class in DiseaseClass::ALL {
        let dir = root.join(class.id());
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            leaf_image(class, i)
                .save(dir.join(format!("leaf_{:02}.png", i)))
                .unwrap();
        }
    }
}

fn small_training_config() -> TrainingConfig {
    TrainingConfig {
        epochs: 2,
        batch_size: 4,
        seed: Some(7),
        model: GrapeLeafClassifierConfig::new()
            .with_backbone(MobileNetV2Config::new().with_width_multiplier(0.25))
            .with_hidden_units(8),
        ..TrainingConfig::default()
    }
}

fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut bytes, format)
        .unwrap();
    bytes.into_inner()
}

#[test]
fn trained_artifact_reproduces_validation_accuracy() {
    let tmp = TempDir::new().unwrap();
    let train_dir = tmp.path().join("train");
    let valid_dir = tmp.path().join("valid");
    write_split(&train_dir, 4);
    write_split(&valid_dir, 3);

    let trainer = Trainer::<TrainingBackend>::new(small_training_config(), default_device()).unwrap();
    let report = trainer
        .run(&train_dir, &valid_dir, &tmp.path().join("out/model"))
        .unwrap();

    assert_eq!(report.epochs.len(), 2);
    assert_eq!(report.artifact_path, artifact_file(&tmp.path().join("out/model")));
    assert!(report.artifact_path.is_file());
    assert!(TrainingReport::history_path(&report.artifact_path).is_file());
    assert!(!report.pretrained_backbone);
    assert_eq!(report.train_stats.total, 16);
    // 12 validation images in batches of 4
    assert_eq!(report.final_metrics.total_samples, 12);
    for epoch in &report.epochs {
        assert!(epoch.train_loss.is_finite());
        assert!(epoch.val_loss.is_finite());
    }

    let device = default_device();
    let (model, _) = load_artifact::<InferenceBackend>(&report.artifact_path, &device).unwrap();
    let valid_set = GrapeLeafDataset::load(&valid_dir).unwrap();
    let mut stream = BatchStream::validation(&valid_set, 4).unwrap();
    let evaluation = evaluate(&model, &mut stream, &device).unwrap();

    assert_eq!(evaluation.accuracy, report.final_val_accuracy());
    assert_eq!(
        evaluation.metrics.confusion_matrix,
        report.final_metrics.confusion_matrix
    );

    let diagnoser = Diagnoser::new(SharedEngine::<InferenceBackend>::new(
        &report.artifact_path,
        device,
    ));
    let upload = encode(&leaf_image(DiseaseClass::Esca, 1), ImageFormat::Png);
    let first = diagnoser.diagnose_upload(&upload).unwrap();
    let second = diagnoser.diagnose_upload(&upload).unwrap();
    assert_eq!(first.prediction, second.prediction);
    assert!((first.prediction.per_class_probabilities.sum() - 1.0).abs() < 1e-5);
}

#[test]
fn missing_class_directory_is_a_dataset_error() {
    let tmp = TempDir::new().unwrap();
    let train_dir = tmp.path().join("train");
    let valid_dir = tmp.path().join("valid");
    write_split(&train_dir, 4);
    write_split(&valid_dir, 4);
    std::fs::remove_dir_all(train_dir.join("black_rot")).unwrap();

    let trainer = Trainer::<TrainingBackend>::new(small_training_config(), default_device()).unwrap();
    let err = trainer
        .run(&train_dir, &valid_dir, &tmp.path().join("model"))
        .unwrap_err();

    assert!(matches!(err, GrapeLeafError::Dataset(_, _)));
    assert!(!artifact_file(&tmp.path().join("model")).exists());
}

#[test]
fn uploads_of_any_size_become_unit_range_tensors() {
    let photo = RgbImage::from_fn(640, 480, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));

    for format in [ImageFormat::Jpeg, ImageFormat::Png] {
        let tensor = preprocess_upload(&encode(&photo, format)).unwrap();
        assert_eq!(tensor.as_slice().len(), 224 * 224 * 3);
        assert!(tensor.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }
}

#[test]
fn empty_upload_never_loads_the_model() {
    let diagnoser = Diagnoser::new(SharedEngine::<InferenceBackend>::new(
        "/no/such/artifact",
        default_device(),
    ));

    let err = diagnoser.diagnose_upload(&[]).unwrap_err();
    assert!(matches!(err, GrapeLeafError::InvalidImage(_)));
    assert!(!diagnoser.engine().is_loaded());
}

#[test]
fn decision_layer_examples() {
    let uniform = decide(&ClassProbabilities::new([0.25, 0.25, 0.25, 0.25]));
    assert_eq!(uniform.predicted_class, DiseaseClass::Healthy);

    let confident = decide(&ClassProbabilities::new([0.91, 0.04, 0.03, 0.02]));
    assert_eq!(confident.predicted_class, DiseaseClass::Healthy);
    assert_eq!(confident.confidence, 0.91);

    let record = StaticDiseaseCatalog::new()
        .record(confident.predicted_class)
        .clone();
    assert!(record.treatment.contains("No treatment needed"));
}
