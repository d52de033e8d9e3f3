//! MobileNetV2 feature extractor
//!
//! Mirrors torchvision's `mobilenet_v2` feature layers so that ImageNet
//! weights published as a PyTorch state dict can be imported directly
//! (see [`load_pretrained`]). Only the convolutional trunk is kept; the
//! ImageNet classifier is replaced by [`crate::model::head::ClassifierHead`].
//!
//! Layout (224×224 input):
//! - stem: 3×3 conv stride 2, 32 channels
//! - 17 inverted residual blocks
//! - last: 1×1 conv to 1280 channels, 7×7 spatial

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    record::{FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::info;

use crate::utils::error::{self, GrapeLeafError};

/// (expansion factor, output channels, repeats, first stride)
const INVERTED_RESIDUAL_SETTINGS: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

const STEM_CHANNELS: usize = 32;
const LAST_CHANNELS: usize = 1280;

/// Configuration for the MobileNetV2 backbone
#[derive(Config, Debug)]
pub struct MobileNetV2Config {
    /// Channel width multiplier (1.0 for the ImageNet weights)
    #[config(default = "1.0")]
    pub width_multiplier: f64,
}

impl MobileNetV2Config {
    /// Number of feature channels produced by the backbone
    pub fn out_channels(&self) -> usize {
        make_divisible(LAST_CHANNELS as f64 * self.width_multiplier.max(1.0))
    }

    /// Channels after the stem convolution
    pub fn stem_channels(&self) -> usize {
        make_divisible(STEM_CHANNELS as f64 * self.width_multiplier)
    }

    /// Number of inverted residual blocks
    pub fn num_blocks(&self) -> usize {
        INVERTED_RESIDUAL_SETTINGS.iter().map(|&(_, _, n, _)| n).sum()
    }

    /// Initialize a randomly weighted backbone
    pub fn init<B: Backend>(&self, device: &B::Device) -> MobileNetV2<B> {
        let mut in_channels = self.stem_channels();
        let stem = ConvNormActivation::new(3, in_channels, 3, 2, 1, device);

        let mut blocks = Vec::with_capacity(self.num_blocks());
        for &(expansion, channels, repeats, stride) in INVERTED_RESIDUAL_SETTINGS.iter() {
            let out_channels = make_divisible(channels as f64 * self.width_multiplier);
            for i in 0..repeats {
                let stride = if i == 0 { stride } else { 1 };
                blocks.push(InvertedResidual::new(
                    in_channels,
                    out_channels,
                    stride,
                    expansion,
                    device,
                ));
                in_channels = out_channels;
            }
        }

        let last = ConvNormActivation::new(in_channels, self.out_channels(), 1, 1, 1, device);

        MobileNetV2 { stem, blocks, last }
    }
}

/// Round channel counts to a multiple of 8, never dropping more than 10%
fn make_divisible(value: f64) -> usize {
    const DIVISOR: usize = 8;
    let rounded = ((value + DIVISOR as f64 / 2.0) as usize / DIVISOR) * DIVISOR;
    let mut channels = rounded.max(DIVISOR);
    if (channels as f64) < 0.9 * value {
        channels += DIVISOR;
    }
    channels
}

/// Conv2d + BatchNorm + ReLU6
#[derive(Module, Debug)]
pub struct ConvNormActivation<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvNormActivation<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let padding = (kernel_size - 1) / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);

        Self {
            conv,
            norm: BatchNormConfig::new(out_channels).init::<B, 2>(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        relu6(x)
    }
}

/// Inverted residual block: 1×1 expand, 3×3 depthwise, 1×1 linear projection
///
/// The skip connection is used when the block keeps the input shape
/// (stride 1 and equal channel counts).
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    /// Absent when the expansion factor is 1
    pub expand: Option<ConvNormActivation<B>>,
    pub depthwise: ConvNormActivation<B>,
    pub project: Conv2d<B>,
    pub project_norm: BatchNorm<B, 2>,
}

impl<B: Backend> InvertedResidual<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expansion: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expansion;

        let expand = (expansion != 1)
            .then(|| ConvNormActivation::new(in_channels, hidden, 1, 1, 1, device));
        let depthwise = ConvNormActivation::new(hidden, hidden, 3, stride, hidden, device);
        let project = Conv2dConfig::new([hidden, out_channels], [1, 1])
            .with_bias(false)
            .init(device);

        Self {
            expand,
            depthwise,
            project,
            project_norm: BatchNormConfig::new(out_channels).init::<B, 2>(device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => expand.forward(input.clone()),
            None => input.clone(),
        };
        let x = self.depthwise.forward(x);
        let x = self.project_norm.forward(self.project.forward(x));

        if x.dims() == input.dims() {
            x + input
        } else {
            x
        }
    }
}

/// MobileNetV2 convolutional trunk
#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    pub stem: ConvNormActivation<B>,
    pub blocks: Vec<InvertedResidual<B>>,
    pub last: ConvNormActivation<B>,
}

impl<B: Backend> MobileNetV2<B> {
    /// Feature maps of shape [batch, out_channels, H/32, W/32]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.stem.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.last.forward(x)
    }
}

fn relu6<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clamp(0.0, 6.0)
}

/// Key remaps from torchvision's `features.*` names to this module tree
fn torchvision_key_remaps(num_blocks: usize) -> Vec<(String, String)> {
    let mut remaps = vec![
        (r"^features\.0\.0\.(.+)$".to_string(), "stem.conv.$1".to_string()),
        (r"^features\.0\.1\.(.+)$".to_string(), "stem.norm.$1".to_string()),
    ];

    for feature in 1..=num_blocks {
        let block = feature - 1;
        let prefix = format!(r"^features\.{}\.conv\.", feature);

        // The first block has no expansion layer, shifting every index down
        let layers: &[(&str, &str)] = if feature == 1 {
            &[
                (r"0\.0\.", "depthwise.conv."),
                (r"0\.1\.", "depthwise.norm."),
                (r"1\.", "project."),
                (r"2\.", "project_norm."),
            ]
        } else {
            &[
                (r"0\.0\.", "expand.conv."),
                (r"0\.1\.", "expand.norm."),
                (r"1\.0\.", "depthwise.conv."),
                (r"1\.1\.", "depthwise.norm."),
                (r"2\.", "project."),
                (r"3\.", "project_norm."),
            ]
        };

        for (source, target) in layers {
            remaps.push((
                format!("{}{}(.+)$", prefix, source),
                format!("blocks.{}.{}$1", block, target),
            ));
        }
    }

    let last = num_blocks + 1;
    remaps.push((format!(r"^features\.{}\.0\.(.+)$", last), "last.conv.$1".to_string()));
    remaps.push((format!(r"^features\.{}\.1\.(.+)$", last), "last.norm.$1".to_string()));

    remaps
}

/// Load ImageNet weights from a torchvision `mobilenet_v2` state dict (`.pth`)
///
/// Only width multiplier 1.0 matches the published weights. The ImageNet
/// classifier entries in the file are ignored.
pub fn load_pretrained<B: Backend>(
    config: &MobileNetV2Config,
    path: &Path,
    device: &B::Device,
) -> error::Result<MobileNetV2<B>> {
    if (config.width_multiplier - 1.0).abs() > f64::EPSILON {
        return Err(GrapeLeafError::artifact(
            path,
            format!(
                "pretrained weights require width multiplier 1.0, got {}",
                config.width_multiplier
            ),
        ));
    }
    if !path.is_file() {
        return Err(GrapeLeafError::artifact(path, "weights file not found"));
    }

    let mut args = LoadArgs::new(path.to_path_buf());
    for (pattern, replacement) in torchvision_key_remaps(config.num_blocks()) {
        args = args.with_key_remap(&pattern, &replacement);
    }

    let record: MobileNetV2Record<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .map_err(|e| GrapeLeafError::artifact(path, e.to_string()))?;

    info!("Loaded pretrained MobileNetV2 weights from {:?}", path);

    Ok(config.init::<B>(device).load_record(record))
}
