//! Transfer-learning loop
//!
//! A custom loop rather than burn's `LearnerBuilder`: the backbone lives on
//! the inner backend (no autodiff graph, inference-mode batch norm) while the
//! head lives on the autodiff backend and is the only module handed to the
//! optimizer. Backbone features cross over with `Tensor::from_inner`.

use std::path::Path;
use std::time::Instant;

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::backend::backend_name;
use crate::dataset::{BatchStream, GrapeLeafDataset, LeafBatch, LeafBatcher};
use crate::model::{
    classifier::normalize_imagenet, load_pretrained, save_artifact, GrapeLeafClassifier,
    MobileNetV2,
};
use crate::training::{EpochMetrics, TrainingConfig, TrainingReport};
use crate::utils::error::{GrapeLeafError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::Metrics;

/// Loss and metrics from one pass over a validation stream
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Mean cross-entropy per batch
    pub loss: f64,
    pub accuracy: f64,
    pub metrics: Metrics,
}

/// Trains the classifier head on top of a frozen backbone
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Result<Self> {
        config.validate().map_err(GrapeLeafError::Config)?;
        Ok(Self { config, device })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on `train_dir`, validate on `valid_dir` after every epoch and
    /// write the final model to `artifact_path` (extension is appended)
    ///
    /// Both directories are checked before the model is built, so a broken
    /// layout fails fast.
    pub fn run(
        &self,
        train_dir: &Path,
        valid_dir: &Path,
        artifact_path: &Path,
    ) -> Result<TrainingReport> {
        let started_at = Utc::now();
        let config = &self.config;

        let train_set = GrapeLeafDataset::load(train_dir)?;
        let valid_set = GrapeLeafDataset::load(valid_dir)?;
        let train_stats = train_set.stats();
        let valid_stats = valid_set.stats();
        info!("Training data: {}", train_stats);
        info!("Validation data: {}", valid_stats);

        let mut train_stream = BatchStream::training(
            &train_set,
            config.batch_size,
            config.augmentation.clone(),
            config.seed,
        )?;
        let mut valid_stream = BatchStream::validation(&valid_set, config.batch_size)?;
        let steps = train_stream.steps_per_epoch();

        let (backbone, pretrained_backbone) = self.init_backbone()?;
        let mut head = config.model.head_config().init::<B>(&self.device);
        let mut optimizer = AdamConfig::new().with_epsilon(1e-7).init();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let batcher = LeafBatcher::new();

        info!(
            "Training on {} for {} epochs: {} steps of {} images, lr {}",
            backend_name(),
            config.epochs,
            steps,
            config.batch_size,
            config.learning_rate
        );

        let mut logger = TrainingLogger::new(config.epochs);
        let mut history = Vec::with_capacity(config.epochs);
        let mut last_evaluation = None;

        for epoch in 0..config.epochs {
            logger.start_epoch(epoch);
            let epoch_start = Instant::now();
            let progress = epoch_progress_bar(epoch, config.epochs, steps);

            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;
            let mut seen = 0usize;

            for step in 0..steps {
                let items = train_stream.next_batch()?;
                let batch: LeafBatch<B> = batcher.batch(items, &self.device);
                let batch_len = batch.targets.dims()[0];

                let features = backbone.forward(normalize_imagenet(batch.images.inner()));
                let logits = head.forward(Tensor::<B, 4>::from_inner(features));
                let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

                let loss_value: f64 = loss.clone().into_scalar().elem();
                if let Err(e) = check_loss(epoch, step, loss_value) {
                    progress.abandon();
                    return Err(e);
                }

                loss_sum += loss_value;
                correct += count_correct(logits, batch.targets);
                seen += batch_len;

                let grads = GradientsParams::from_grads(loss.backward(), &head);
                head = optimizer.step(config.learning_rate, head, grads);

                progress.set_message(format!("loss {:.4}", loss_value));
                progress.inc(1);
            }
            progress.finish_and_clear();

            let model = GrapeLeafClassifier {
                backbone: backbone.clone(),
                head: head.valid(),
            };
            let evaluation = evaluate(&model, &mut valid_stream, &self.device)?;

            let metrics = EpochMetrics {
                epoch: epoch + 1,
                train_loss: loss_sum / steps.max(1) as f64,
                train_accuracy: correct as f64 / seen.max(1) as f64,
                val_loss: evaluation.loss,
                val_accuracy: evaluation.accuracy,
                duration_secs: epoch_start.elapsed().as_secs_f64(),
            };
            logger.end_epoch(&metrics);
            history.push(metrics);
            last_evaluation = Some(evaluation);
        }

        let model = GrapeLeafClassifier {
            backbone,
            head: head.valid(),
        };
        let artifact_file = save_artifact(&model, &config.model, artifact_path)?;

        let final_metrics = last_evaluation
            .map(|evaluation| evaluation.metrics)
            .unwrap_or_default();
        logger.log_complete(final_metrics.accuracy);

        let report = TrainingReport {
            artifact_path: artifact_file.clone(),
            config: config.clone(),
            backend: backend_name().to_string(),
            pretrained_backbone,
            train_stats,
            valid_stats,
            epochs: history,
            final_metrics,
            started_at,
            finished_at: Utc::now(),
        };

        let history_file = TrainingReport::history_path(&artifact_file);
        report.save(&history_file)?;
        info!("Training history written to {:?}", history_file);

        Ok(report)
    }

    fn init_backbone(&self) -> Result<(MobileNetV2<B::InnerBackend>, bool)> {
        let backbone_config = &self.config.model.backbone;
        match &self.config.backbone_weights {
            Some(path) => {
                let backbone =
                    load_pretrained::<B::InnerBackend>(backbone_config, path, &self.device)?;
                Ok((backbone, true))
            }
            None => {
                warn!("No pretrained backbone weights given, starting from random initialization");
                Ok((backbone_config.init::<B::InnerBackend>(&self.device), false))
            }
        }
    }
}

/// Run one full pass of a validation stream through the model
///
/// The stream is restarted first, so every call sees the same
/// `steps_per_epoch` batches.
pub fn evaluate<B: Backend>(
    model: &GrapeLeafClassifier<B>,
    stream: &mut BatchStream,
    device: &B::Device,
) -> Result<Evaluation> {
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let batcher = LeafBatcher::new();
    let steps = stream.steps_per_epoch();
    stream.restart();

    let mut loss_sum = 0.0f64;
    let mut predictions = Vec::with_capacity(steps * stream.batch_size());
    let mut ground_truth = Vec::with_capacity(steps * stream.batch_size());

    for _ in 0..steps {
        let items = stream.next_batch()?;
        ground_truth.extend(items.iter().map(|item| item.label.index()));

        let batch: LeafBatch<B> = batcher.batch(items, device);
        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets);
        loss_sum += loss.into_scalar().elem::<f64>();

        let predicted = logits
            .argmax(1)
            .flatten::<1>(0, 1)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| GrapeLeafError::Inference(format!("{:?}", e)))?;
        predictions.extend(predicted.into_iter().map(|index| index as usize));
    }

    let metrics = Metrics::from_predictions(&predictions, &ground_truth);
    Ok(Evaluation {
        loss: loss_sum / steps.max(1) as f64,
        accuracy: metrics.accuracy,
        metrics,
    })
}

/// Reject a NaN or infinite training loss; `epoch` and `step` are 0-based
fn check_loss(epoch: usize, step: usize, loss: f64) -> Result<()> {
    if loss.is_finite() {
        return Ok(());
    }
    Err(GrapeLeafError::NumericDivergence {
        epoch: epoch + 1,
        step: step + 1,
        loss,
    })
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let correct: i64 = logits
        .argmax(1)
        .flatten::<1>(0, 1)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

fn epoch_progress_bar(epoch: usize, total_epochs: usize, steps: usize) -> ProgressBar {
    let progress = ProgressBar::new(steps as u64);
    let style = ProgressStyle::default_bar()
        .template("  {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.set_prefix(format!("Epoch {}/{}", epoch + 1, total_epochs));
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, InferenceBackend, TrainingBackend};
    use crate::dataset::DiseaseClass;
    use crate::model::{GrapeLeafClassifierConfig, MobileNetV2Config};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_split(root: &Path, per_class: usize) {
        for class in DiseaseClass::ALL {
            let dir = root.join(class.id());
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let shade = (class.index() * 60 + i * 5) as u8;
                RgbImage::from_pixel(32, 32, Rgb([shade, 255 - shade, 40]))
                    .save(dir.join(format!("leaf_{}.png", i)))
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = TrainingConfig::default();
        config.epochs = 0;
        let result = Trainer::<TrainingBackend>::new(config, default_device());
        assert!(matches!(result, Err(GrapeLeafError::Config(_))));
    }

    #[test]
    fn test_check_loss_accepts_finite_values() {
        assert!(check_loss(0, 0, 1.386).is_ok());
        assert!(check_loss(3, 10, 0.0).is_ok());
    }

    #[test]
    fn test_check_loss_rejects_non_finite_values() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            match check_loss(2, 6, bad) {
                Err(GrapeLeafError::NumericDivergence { epoch, step, loss }) => {
                    assert_eq!(epoch, 3);
                    assert_eq!(step, 7);
                    assert!(!loss.is_finite());
                    assert_eq!(loss.is_nan(), bad.is_nan());
                }
                other => panic!("expected divergence for {}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_divergence_writes_no_artifact() {
        let tmp = TempDir::new().unwrap();
        let train = tmp.path().join("train");
        let valid = tmp.path().join("valid");
        write_split(&train, 2);
        write_split(&valid, 2);

        let config = TrainingConfig {
            epochs: 3,
            batch_size: 4,
            learning_rate: 1e30,
            seed: Some(3),
            augmentation: crate::dataset::AugmentationConfig::none(),
            model: GrapeLeafClassifierConfig::new()
                .with_backbone(MobileNetV2Config::new().with_width_multiplier(0.25))
                .with_hidden_units(8),
            backbone_weights: None,
        };
        let trainer = Trainer::<TrainingBackend>::new(config, default_device()).unwrap();
        let result = trainer.run(&train, &valid, &tmp.path().join("model"));

        // Divergence is likely but not guaranteed at this rate
        match result {
            Err(GrapeLeafError::NumericDivergence { epoch, step, .. }) => {
                assert!(epoch >= 1 && step >= 1);
                assert!(!tmp.path().join("model.mpk").exists());
            }
            Ok(report) => assert!(report.artifact_path.is_file()),
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_class_fails_before_training() {
        let tmp = TempDir::new().unwrap();
        let train = tmp.path().join("train");
        write_split(&train, 2);
        std::fs::remove_dir_all(train.join("esca")).unwrap();
        let valid = tmp.path().join("valid");
        write_split(&valid, 2);

        let trainer = Trainer::<TrainingBackend>::new(TrainingConfig::default(), default_device())
            .unwrap();
        let err = trainer
            .run(&train, &valid, &tmp.path().join("model"))
            .unwrap_err();
        assert!(matches!(err, GrapeLeafError::Dataset(_, _)));
        assert!(!tmp.path().join("model.mpk").exists());
    }

    #[test]
    fn test_evaluate_covers_full_batches_only() {
        let tmp = TempDir::new().unwrap();
        write_split(tmp.path(), 3);
        let dataset = GrapeLeafDataset::load(tmp.path()).unwrap();
        let mut stream = BatchStream::validation(&dataset, 5).unwrap();

        let device = default_device();
        let model = GrapeLeafClassifierConfig::new()
            .with_backbone(MobileNetV2Config::new().with_width_multiplier(0.25))
            .with_hidden_units(8)
            .init::<InferenceBackend>(&device);

        let first = evaluate(&model, &mut stream, &device).unwrap();
        // 12 images, batches of 5: two steps
        assert_eq!(first.metrics.total_samples, 10);
        assert!(first.loss.is_finite());
        assert!((0.0..=1.0).contains(&first.accuracy));

        let second = evaluate(&model, &mut stream, &device).unwrap();
        assert_eq!(first.accuracy, second.accuracy);
        assert_eq!(first.loss, second.loss);
    }
}
