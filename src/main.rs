//! Grape Leaf Disease Classifier CLI
//!
//! Operator entry point: train the classifier, diagnose leaf images with a
//! trained artifact, and inspect dataset directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use grape_leaf_disease::backend::{backend_name, default_device, InferenceBackend, TrainingBackend};
use grape_leaf_disease::dataset::{AugmentationConfig, GrapeLeafDataset};
use grape_leaf_disease::inference::{Diagnoser, Diagnosis, SharedEngine};
use grape_leaf_disease::training::{Trainer, TrainingConfig, TrainingReport};
use grape_leaf_disease::utils::logging::{init_logging, LogConfig};
use grape_leaf_disease::DiseaseClass;

/// Grape leaf disease classification with Burn
///
/// Transfer learning on a frozen MobileNetV2 backbone. Distinguishes healthy
/// leaves from leaf blight, esca and black rot.
#[derive(Parser, Debug)]
#[command(name = "grape-leaf")]
#[command(version)]
#[command(about = "Grape leaf disease classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the classifier head on a frozen backbone
    Train {
        /// Training directory with one subdirectory per class
        #[arg(long)]
        train_dir: PathBuf,

        /// Validation directory with one subdirectory per class
        #[arg(long)]
        valid_dir: PathBuf,

        /// Artifact path without extension (`.mpk` is appended)
        #[arg(short, long, default_value = "output/grape_leaf_classifier")]
        output: PathBuf,

        /// Training configuration JSON; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training and validation
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Adam learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Seed for shuffling and augmentation
        #[arg(long)]
        seed: Option<u64>,

        /// Torchvision mobilenet_v2 weights (.pth) for the backbone
        #[arg(long)]
        backbone_weights: Option<PathBuf>,

        /// Train without augmentation
        #[arg(long, default_value = "false")]
        no_augmentation: bool,
    },

    /// Diagnose one or more leaf images
    Infer {
        /// Path to the trained model artifact
        #[arg(short, long)]
        model: PathBuf,

        /// JPEG or PNG images
        #[arg(short, long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,
    },

    /// Show per-class image counts of a dataset directory
    Stats {
        /// Dataset directory with one subdirectory per class
        #[arg(short, long)]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train {
            train_dir,
            valid_dir,
            output,
            config,
            epochs,
            batch_size,
            learning_rate,
            seed,
            backbone_weights,
            no_augmentation,
        } => {
            let mut training_config = match config {
                Some(path) => TrainingConfig::load(&path)
                    .with_context(|| format!("Failed to load training config {:?}", path))?,
                None => TrainingConfig::default(),
            };
            if let Some(epochs) = epochs {
                training_config.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                training_config.batch_size = batch_size;
            }
            if let Some(learning_rate) = learning_rate {
                training_config.learning_rate = learning_rate;
            }
            if seed.is_some() {
                training_config.seed = seed;
            }
            if backbone_weights.is_some() {
                training_config.backbone_weights = backbone_weights;
            }
            if no_augmentation {
                training_config.augmentation = AugmentationConfig::none();
            }

            cmd_train(training_config, &train_dir, &valid_dir, &output)?;
        }

        Commands::Infer { model, input } => {
            cmd_infer(&model, &input)?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn cmd_train(
    config: TrainingConfig,
    train_dir: &Path,
    valid_dir: &Path,
    output: &Path,
) -> Result<()> {
    println!("{}", "Initializing Training...".green().bold());
    println!("  Backend:       {}", backend_name());
    println!("  Epochs:        {}", config.epochs);
    println!("  Batch size:    {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    match config.seed {
        Some(seed) => println!("  Seed:          {}", seed),
        None => println!("  Seed:          {}", "random".dimmed()),
    }
    println!();

    let trainer = Trainer::<TrainingBackend>::new(config, default_device())?;
    let report = trainer.run(train_dir, valid_dir, output)?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &TrainingReport) {
    println!();
    println!("{}", "Training Complete!".green().bold());
    println!(
        "  Final validation accuracy: {:.2}%",
        report.final_val_accuracy() * 100.0
    );
    println!("  Macro F1:                  {:.3}", report.final_metrics.macro_f1);

    println!();
    println!("{}", "Per-class validation metrics:".cyan().bold());
    for class_metrics in &report.final_metrics.per_class {
        println!(
            "  {:12} precision {:.3}  recall {:.3}  f1 {:.3}  support {}",
            class_metrics.class.id(),
            class_metrics.precision,
            class_metrics.recall,
            class_metrics.f1,
            class_metrics.support
        );
    }

    if !report.pretrained_backbone {
        println!();
        println!(
            "{} the backbone was not initialized from pretrained weights",
            "Note:".yellow()
        );
    }

    println!();
    println!("  Model saved to: {:?}", report.artifact_path);
    println!(
        "  Next: grape-leaf infer --model {:?} --input <image>",
        report.artifact_path
    );
}

fn cmd_infer(model: &Path, inputs: &[PathBuf]) -> Result<()> {
    info!("Diagnosing {} image(s) with {:?}", inputs.len(), model);

    let diagnoser = Diagnoser::new(SharedEngine::<InferenceBackend>::new(model, default_device()));

    for path in inputs {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;

        match diagnoser.diagnose_upload(&bytes) {
            Ok(diagnosis) => print_diagnosis(path, &diagnosis),
            Err(e) if e.is_user_correctable() => {
                println!("{} {:?}: {}", "Skipped".yellow(), path, e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn print_diagnosis(path: &Path, diagnosis: &Diagnosis) {
    let prediction = &diagnosis.prediction;
    let label = if prediction.predicted_class.is_healthy() {
        diagnosis.record.name.green().bold()
    } else {
        diagnosis.record.name.red().bold()
    };

    println!();
    println!("{} {:?}", "Image:".cyan(), path);
    println!("  Prediction: {} ({:.2}%)", label, prediction.confidence * 100.0);
    print!("{}", prediction.per_class_probabilities);
    println!("  {}", diagnosis.record.description);
    println!("  {} {}", "Treatment:".cyan(), diagnosis.record.treatment);
    println!("  {} {}", "Prevention:".cyan(), diagnosis.record.prevention);
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    let dataset = GrapeLeafDataset::load(data_dir)?;
    let stats = dataset.stats();

    println!("{}", "Dataset Statistics:".cyan().bold());
    println!("  Root:   {:?}", stats.root_dir);
    println!("  Images: {}", stats.total);
    for class in DiseaseClass::ALL {
        let count = stats.count(class);
        let share = if stats.total > 0 {
            100.0 * count as f64 / stats.total as f64
        } else {
            0.0
        };
        println!("  {:12} {:>6} ({:.1}%)", class.id(), count, share);
    }
    println!("  Imbalance ratio: {:.2}", stats.imbalance_ratio());

    Ok(())
}
