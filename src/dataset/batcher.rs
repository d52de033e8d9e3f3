//! Burn Batcher for grape leaf images
//!
//! Stacks preprocessed image tensors and their labels into the
//! `[batch, 3, 224, 224]` / `[batch]` tensors the model and loss consume.
//! Normalization happens inside the model, so batches stay in [0, 1].

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use crate::dataset::{DiseaseClass, ImageTensor};
use crate::{IMAGE_CHANNELS, IMAGE_SIZE};

/// A single labelled image ready for batching
#[derive(Clone, Debug)]
pub struct LeafItem {
    pub image: ImageTensor,
    pub label: DiseaseClass,
}

/// A batch of grape leaf images
#[derive(Clone, Debug)]
pub struct LeafBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Class indices with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for labelled leaf images
#[derive(Clone, Debug, Default)]
pub struct LeafBatcher;

impl LeafBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, LeafItem, LeafBatch<B>> for LeafBatcher {
    fn batch(&self, items: Vec<LeafItem>, device: &B::Device) -> LeafBatch<B> {
        let batch_size = items.len();

        let mut images_data =
            Vec::with_capacity(batch_size * IMAGE_CHANNELS * IMAGE_SIZE * IMAGE_SIZE);
        let mut targets_data = Vec::with_capacity(batch_size);

        for item in items {
            targets_data.push(item.label.index() as i64);
            images_data.extend(item.image.into_vec());
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(
                images_data,
                [batch_size, IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE],
            ),
            device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        LeafBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, InferenceBackend};
    use image::{Rgb, RgbImage};

    fn item(value: u8, label: DiseaseClass) -> LeafItem {
        let img = RgbImage::from_pixel(224, 224, Rgb([value, value, value]));
        LeafItem {
            image: ImageTensor::from_rgb(&img).unwrap(),
            label,
        }
    }

    #[test]
    fn test_batch_shapes_and_labels() {
        let device = default_device();
        let items = vec![
            item(0, DiseaseClass::Esca),
            item(255, DiseaseClass::Healthy),
            item(51, DiseaseClass::BlackRot),
        ];

        let batch: LeafBatch<InferenceBackend> = LeafBatcher::new().batch(items, &device);

        assert_eq!(batch.images.dims(), [3, 3, 224, 224]);
        assert_eq!(batch.targets.dims(), [3]);

        let targets: Vec<i64> = batch
            .targets
            .into_data()
            .convert::<i64>()
            .to_vec()
            .unwrap();
        assert_eq!(targets, vec![2, 0, 3]);

        // Pixel values are not normalized by the batcher
        let max = batch.images.max().into_scalar();
        assert!((max - 1.0).abs() < 1e-6);
    }
}
