//! Grape leaf classifier: frozen MobileNetV2 backbone + trainable head
//!
//! The two parts are separate fields so training can keep the backbone on
//! the inner (non-autodiff) backend and hand only the head to the optimizer.
//! Inputs are image batches in [0, 1]; ImageNet normalization is applied
//! here, matching the statistics the pretrained backbone was trained with.

use burn::{
    config::Config,
    module::Module,
    tensor::{activation::softmax, backend::Backend, Tensor, TensorData},
};

use crate::model::head::{ClassifierHead, ClassifierHeadConfig};
use crate::model::mobilenet::{MobileNetV2, MobileNetV2Config};

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Configuration for the full classifier
#[derive(Config, Debug)]
pub struct GrapeLeafClassifierConfig {
    /// Backbone configuration
    #[config(default = "MobileNetV2Config::new()")]
    pub backbone: MobileNetV2Config,

    /// Width of the head's hidden dense layer
    #[config(default = "1024")]
    pub hidden_units: usize,

    /// Number of output classes
    #[config(default = "4")]
    pub num_classes: usize,
}

impl GrapeLeafClassifierConfig {
    pub fn head_config(&self) -> ClassifierHeadConfig {
        ClassifierHeadConfig::new(self.backbone.out_channels())
            .with_hidden_units(self.hidden_units)
            .with_num_classes(self.num_classes)
    }

    /// Initialize with a randomly weighted backbone
    pub fn init<B: Backend>(&self, device: &B::Device) -> GrapeLeafClassifier<B> {
        self.init_with_backbone(self.backbone.init(device), device)
    }

    /// Initialize a fresh head on top of an existing backbone
    pub fn init_with_backbone<B: Backend>(
        &self,
        backbone: MobileNetV2<B>,
        device: &B::Device,
    ) -> GrapeLeafClassifier<B> {
        GrapeLeafClassifier {
            backbone,
            head: self.head_config().init(device),
        }
    }
}

/// Backbone + head
#[derive(Module, Debug)]
pub struct GrapeLeafClassifier<B: Backend> {
    pub backbone: MobileNetV2<B>,
    pub head: ClassifierHead<B>,
}

impl<B: Backend> GrapeLeafClassifier<B> {
    /// Backbone feature maps for a [batch_size, 3, H, W] batch in [0, 1]
    pub fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.backbone.forward(normalize_imagenet(images))
    }

    /// Logits of shape [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.features(images))
    }

    /// Class probabilities of shape [batch_size, num_classes]; rows sum to 1
    pub fn forward_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// Check the loaded weights against a configuration
    pub fn check_architecture(
        &self,
        config: &GrapeLeafClassifierConfig,
    ) -> std::result::Result<(), String> {
        let expected = (
            config.backbone.out_channels(),
            config.hidden_units,
            config.num_classes,
        );
        let actual = self.head.dims();
        if actual != expected {
            return Err(format!(
                "head dimensions {:?} do not match configuration {:?}",
                actual, expected
            ));
        }

        if self.backbone.blocks.len() != config.backbone.num_blocks() {
            return Err(format!(
                "backbone has {} blocks, expected {}",
                self.backbone.blocks.len(),
                config.backbone.num_blocks()
            ));
        }

        let [stem_channels, _, _, _] = self.backbone.stem.conv.weight.val().dims();
        if stem_channels != config.backbone.stem_channels() {
            return Err(format!(
                "stem has {} channels, expected {}",
                stem_channels,
                config.backbone.stem_channels()
            ));
        }

        Ok(())
    }
}

/// Apply `(x - mean) / std` per channel
pub fn normalize_imagenet<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = images.device();
    let mean = Tensor::<B, 4>::from_floats(
        TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
        &device,
    );
    let std = Tensor::<B, 4>::from_floats(
        TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
        &device,
    );
    (images - mean) / std
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_device, InferenceBackend};

    type TestBackend = InferenceBackend;

    fn small_config() -> GrapeLeafClassifierConfig {
        GrapeLeafClassifierConfig::new()
            .with_backbone(MobileNetV2Config::new().with_width_multiplier(0.25))
            .with_hidden_units(16)
    }

    #[test]
    fn test_default_config() {
        let config = GrapeLeafClassifierConfig::new();
        assert_eq!(config.hidden_units, 1024);
        assert_eq!(config.num_classes, 4);
        assert_eq!(config.backbone.width_multiplier, 1.0);
        assert_eq!(config.head_config().in_channels, 1280);
    }

    #[test]
    fn test_probabilities_are_a_distribution() {
        let device = default_device();
        let model = small_config().init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::random(
            [3, 3, 224, 224],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let probs = model.forward_probabilities(images);
        assert_eq!(probs.dims(), [3, 4]);

        let values: Vec<f32> = probs.into_data().convert::<f32>().to_vec().unwrap();
        for row in values.chunks(4) {
            assert!(row.iter().all(|&p| p >= 0.0));
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_normalization_maps_mean_to_zero() {
        let device = default_device();
        let data: Vec<f32> = IMAGENET_MEAN.to_vec();
        let images =
            Tensor::<TestBackend, 4>::from_floats(TensorData::new(data, [1, 3, 1, 1]), &device);

        let normalized: Vec<f32> = normalize_imagenet(images)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();
        assert!(normalized.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_architecture_check() {
        let device = default_device();
        let config = small_config();
        let model = config.init::<TestBackend>(&device);
        assert!(model.check_architecture(&config).is_ok());

        let wider = small_config().with_hidden_units(32);
        assert!(model.check_architecture(&wider).is_err());
    }
}
