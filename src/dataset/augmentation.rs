//! Data Augmentation Module for Grape Leaf Classification
//!
//! Random geometric variants of training images: rotation, horizontal and
//! vertical shift, and horizontal mirroring. The three are composed into a
//! single affine map and applied in one resampling pass, so an image is only
//! interpolated once no matter how many transforms fire.
//!
//! # Augmentation Strategy
//!
//! - **Training**: every image gets freshly sampled parameters on every pass
//! - **Validation / Inference**: no augmentation
//!
//! Pixels that a rotation or shift pulls in from outside the frame take the
//! value of the nearest edge pixel.

use image::{Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Maximum horizontal shift as a fraction of the width
    pub width_shift: f32,
    /// Maximum vertical shift as a fraction of the height
    pub height_shift: f32,
    /// Probability of a horizontal mirror (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 20.0,
            width_shift: 0.2,
            height_shift: 0.2,
            horizontal_flip_prob: 0.5,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations (for validation/inference)
    pub fn none() -> Self {
        Self {
            rotation_degrees: 0.0,
            width_shift: 0.0,
            height_shift: 0.0,
            horizontal_flip_prob: 0.0,
        }
    }

    /// Whether any transform can fire
    pub fn is_enabled(&self) -> bool {
        self.rotation_degrees > 0.0
            || self.width_shift > 0.0
            || self.height_shift > 0.0
            || self.horizontal_flip_prob > 0.0
    }

    /// Check ranges; shifts and flip probability are fractions
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=180.0).contains(&self.rotation_degrees) {
            return Err(format!(
                "rotation_degrees must be in [0, 180], got {}",
                self.rotation_degrees
            ));
        }
        for (name, value) in [
            ("width_shift", self.width_shift),
            ("height_shift", self.height_shift),
            ("horizontal_flip_prob", self.horizontal_flip_prob),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", name, value));
            }
        }
        Ok(())
    }
}

/// One concrete draw of augmentation parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AugmentParams {
    /// Counter-clockwise rotation in degrees
    pub angle_degrees: f32,
    /// Horizontal shift in pixels (positive moves content right)
    pub shift_x: f32,
    /// Vertical shift in pixels (positive moves content down)
    pub shift_y: f32,
    /// Mirror left-right
    pub flip: bool,
}

impl AugmentParams {
    pub fn identity() -> Self {
        Self {
            angle_degrees: 0.0,
            shift_x: 0.0,
            shift_y: 0.0,
            flip: false,
        }
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    /// Create a new augmenter with the given configuration
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Create an augmenter with no augmentation (for validation)
    pub fn no_augmentation() -> Self {
        Self::new(AugmentationConfig::none())
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Draw independent parameters for an image of the given size
    pub fn sample_params(&self, width: u32, height: u32, rng: &mut ChaCha8Rng) -> AugmentParams {
        let angle_degrees = symmetric(rng, self.config.rotation_degrees);
        let shift_x = symmetric(rng, self.config.width_shift) * width as f32;
        let shift_y = symmetric(rng, self.config.height_shift) * height as f32;
        let flip = self.config.horizontal_flip_prob > 0.0
            && rng.gen::<f32>() < self.config.horizontal_flip_prob;

        AugmentParams {
            angle_degrees,
            shift_x,
            shift_y,
            flip,
        }
    }

    /// Apply randomly sampled transforms to an image
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        if !self.config.is_enabled() {
            return img.clone();
        }
        let params = self.sample_params(img.width(), img.height(), rng);
        apply(img, &params)
    }
}

/// Uniform sample in `[-limit, limit]`, or 0 when the transform is disabled
fn symmetric(rng: &mut ChaCha8Rng, limit: f32) -> f32 {
    if limit > 0.0 {
        rng.gen_range(-limit..=limit)
    } else {
        0.0
    }
}

/// Apply rotation about the centre, then the shift, then the mirror
///
/// Each output pixel is mapped back through the inverse transform and
/// sampled bilinearly from the source.
pub fn apply(img: &RgbImage, params: &AugmentParams) -> RgbImage {
    if *params == AugmentParams::identity() {
        return img.clone();
    }

    let (width, height) = img.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    let angle_rad = params.angle_degrees.to_radians();
    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();

    RgbImage::from_fn(width, height, |x, y| {
        let mut px = x as f32;
        let py = y as f32;

        if params.flip {
            px = width as f32 - 1.0 - px;
        }

        // Undo the shift
        let dx = px - params.shift_x - cx;
        let dy = py - params.shift_y - cy;

        // Undo the rotation (image y axis points down)
        let src_x = cx + dx * cos_a - dy * sin_a;
        let src_y = cy + dx * sin_a + dy * cos_a;

        bilinear_sample(img, src_x, src_y)
    })
}

/// Sample a pixel using bilinear interpolation with edge clamping
fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;

        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}
