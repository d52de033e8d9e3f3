//! Batch streams over a loaded dataset
//!
//! A [`BatchStream`] is an unbounded iterator of fixed-size batches. Each pass
//! over the data visits every sample at most once; the trailing partial batch
//! of a pass is dropped and the next pass starts from a fresh order.
//!
//! - **Training stream**: reshuffles every pass and augments every image
//!   with freshly drawn parameters. Seeded streams are reproducible.
//! - **Validation stream**: file order, no augmentation, fully deterministic.
//!
//! Image decoding for a batch runs in parallel with rayon. Per-item random
//! seeds are drawn sequentially beforehand, so results do not depend on how
//! rayon schedules the work.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::dataset::augmentation::{AugmentationConfig, Augmenter};
use crate::dataset::batcher::LeafItem;
use crate::dataset::loader::{open_image, GrapeLeafDataset, ImageSample};
use crate::dataset::preprocess::{resize_rgb, ImageTensor};
use crate::utils::error::{GrapeLeafError, Result};

/// Unbounded, restartable stream of labelled batches
pub struct BatchStream {
    samples: Vec<ImageSample>,
    batch_size: usize,
    shuffle: bool,
    augmenter: Augmenter,
    rng: ChaCha8Rng,
    order: Vec<usize>,
    cursor: usize,
    passes: usize,
}

impl BatchStream {
    /// Shuffled, augmented stream for training
    ///
    /// Without a seed the shuffle order and the augmentations differ from
    /// run to run.
    pub fn training(
        dataset: &GrapeLeafDataset,
        batch_size: usize,
        augmentation: AugmentationConfig,
        seed: Option<u64>,
    ) -> Result<Self> {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::new(dataset, batch_size, true, Augmenter::new(augmentation), rng)
    }

    /// Unshuffled, unaugmented stream for validation
    pub fn validation(dataset: &GrapeLeafDataset, batch_size: usize) -> Result<Self> {
        Self::new(
            dataset,
            batch_size,
            false,
            Augmenter::no_augmentation(),
            ChaCha8Rng::seed_from_u64(0),
        )
    }

    fn new(
        dataset: &GrapeLeafDataset,
        batch_size: usize,
        shuffle: bool,
        augmenter: Augmenter,
        rng: ChaCha8Rng,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(GrapeLeafError::Config("batch_size must be > 0".to_string()));
        }
        dataset.ensure_min_samples(batch_size)?;

        Ok(Self {
            samples: dataset.samples.clone(),
            batch_size,
            shuffle,
            augmenter,
            rng,
            order: Vec::new(),
            cursor: 0,
            passes: 0,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of full batches in one pass (samples / batch_size, truncated)
    pub fn steps_per_epoch(&self) -> usize {
        self.samples.len() / self.batch_size
    }

    /// Number of passes started so far
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Abandon the current pass; the next batch starts a new one
    pub fn restart(&mut self) {
        self.begin_pass();
    }

    fn begin_pass(&mut self) {
        self.order = (0..self.samples.len()).collect();
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        self.cursor = 0;
        self.passes += 1;
        debug!("Batch stream pass {} started", self.passes);
    }

    /// Produce the next batch, starting a new pass when the current one
    /// cannot fill it
    pub fn next_batch(&mut self) -> Result<Vec<LeafItem>> {
        if self.passes == 0 || self.cursor + self.batch_size > self.order.len() {
            self.begin_pass();
        }

        let indices: Vec<usize> =
            self.order[self.cursor..self.cursor + self.batch_size].to_vec();
        self.cursor += self.batch_size;

        let augment = self.augmenter.config().is_enabled();
        let seeds: Vec<u64> = indices
            .iter()
            .map(|_| if augment { self.rng.gen() } else { 0 })
            .collect();

        let samples = &self.samples;
        let augmenter = &self.augmenter;

        indices
            .par_iter()
            .zip(seeds.par_iter())
            .map(|(&index, &seed)| load_item(&samples[index], augmenter, augment, seed))
            .collect()
    }
}

impl Iterator for BatchStream {
    type Item = Result<Vec<LeafItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

fn load_item(
    sample: &ImageSample,
    augmenter: &Augmenter,
    augment: bool,
    seed: u64,
) -> Result<LeafItem> {
    let img = open_image(&sample.path)?;
    let mut rgb = resize_rgb(&img);

    if augment {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rgb = augmenter.augment(&rgb, &mut rng);
    }

    let image = ImageTensor::from_rgb(&rgb)
        .map_err(|e| GrapeLeafError::dataset(&sample.path, e.to_string()))?;

    Ok(LeafItem {
        image,
        label: sample.label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DiseaseClass;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::TempDir;

    fn make_dataset(per_class: usize) -> (TempDir, GrapeLeafDataset) {
        let tmp = TempDir::new().unwrap();
        for class in DiseaseClass::ALL {
            let dir = tmp.path().join(class.id());
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let img = RgbImage::from_fn(16, 12, |x, y| {
                    Rgb([(x * 10) as u8, (y * 10) as u8, (class.index() * 60 + i) as u8])
                });
                img.save(dir.join(format!("{}.png", i))).unwrap();
            }
        }
        let dataset = GrapeLeafDataset::load(tmp.path()).unwrap();
        (tmp, dataset)
    }

    fn labels(batch: &[LeafItem]) -> Vec<DiseaseClass> {
        batch.iter().map(|item| item.label).collect()
    }

    #[test]
    fn test_steps_truncate() {
        let (_tmp, dataset) = make_dataset(3);
        let stream = BatchStream::validation(&dataset, 5).unwrap();
        assert_eq!(stream.steps_per_epoch(), 2);
    }

    #[test]
    fn test_batch_larger_than_dataset_rejected() {
        let (_tmp, dataset) = make_dataset(1);
        let err = BatchStream::validation(&dataset, 32).err().unwrap();
        assert!(matches!(err, GrapeLeafError::Dataset(_, _)));
    }

    #[test]
    fn test_validation_is_deterministic_and_ordered() {
        let (_tmp, dataset) = make_dataset(2);
        let mut stream = BatchStream::validation(&dataset, 4).unwrap();

        let first = stream.next_batch().unwrap();
        assert_eq!(
            labels(&first),
            vec![
                DiseaseClass::Healthy,
                DiseaseClass::Healthy,
                DiseaseClass::LeafBlight,
                DiseaseClass::LeafBlight
            ]
        );

        stream.restart();
        let again = stream.next_batch().unwrap();
        for (a, b) in first.iter().zip(again.iter()) {
            assert_eq!(a.image, b.image);
        }
    }

    #[test]
    fn test_stream_is_unbounded_and_drops_tail() {
        let (_tmp, dataset) = make_dataset(3);
        let mut stream = BatchStream::validation(&dataset, 5).unwrap();

        for _ in 0..7 {
            assert_eq!(stream.next().unwrap().unwrap().len(), 5);
        }
        // 2 full batches per pass of 12 samples
        assert_eq!(stream.passes(), 4);
    }

    #[test]
    fn test_training_pass_covers_each_sample_once() {
        let (_tmp, dataset) = make_dataset(3);
        let mut stream =
            BatchStream::training(&dataset, 4, AugmentationConfig::default(), Some(11)).unwrap();

        let mut counts = [0usize; 4];
        for _ in 0..stream.steps_per_epoch() {
            for item in stream.next_batch().unwrap() {
                counts[item.label.index()] += 1;
            }
        }
        assert_eq!(counts, [3, 3, 3, 3]);
    }

    #[test]
    fn test_seeded_training_streams_match() {
        let (_tmp, dataset) = make_dataset(2);
        let mut a =
            BatchStream::training(&dataset, 4, AugmentationConfig::default(), Some(5)).unwrap();
        let mut b =
            BatchStream::training(&dataset, 4, AugmentationConfig::default(), Some(5)).unwrap();

        for _ in 0..3 {
            let batch_a = a.next_batch().unwrap();
            let batch_b = b.next_batch().unwrap();
            assert_eq!(labels(&batch_a), labels(&batch_b));
            for (x, y) in batch_a.iter().zip(batch_b.iter()) {
                assert_eq!(x.image, y.image);
            }
        }
    }

    #[test]
    fn test_items_have_fixed_shape() {
        let (_tmp, dataset) = make_dataset(1);
        let mut stream =
            BatchStream::training(&dataset, 4, AugmentationConfig::default(), None).unwrap();
        for item in stream.next_batch().unwrap() {
            assert_eq!(item.image.shape(), [3, 224, 224]);
            assert!(item.image.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_unreadable_image_names_file() {
        let (tmp, dataset) = make_dataset(1);
        let broken = tmp.path().join("esca").join("0.png");
        std::fs::write(&broken, b"not a png").unwrap();

        let mut stream = BatchStream::validation(&dataset, 4).unwrap();
        let err = stream.next_batch().unwrap_err();
        assert!(matches!(err, GrapeLeafError::Dataset(ref p, _) if p == Path::new(&broken)));
    }
}
