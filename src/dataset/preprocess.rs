//! Image Preprocessing
//!
//! Turns an arbitrary raster image into the fixed-shape tensor the model
//! consumes: 3 channels, 224×224, channels-first, values in [0, 1].
//! Training and serving both go through [`preprocess_image`], so the two
//! phases always see identically prepared pixels.

use burn::prelude::*;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};

use crate::utils::error::{GrapeLeafError, Result};
use crate::{IMAGE_CHANNELS, IMAGE_SIZE};

/// Number of f32 values in one image tensor
pub const IMAGE_TENSOR_LEN: usize = IMAGE_CHANNELS * IMAGE_SIZE * IMAGE_SIZE;

/// A preprocessed 3×224×224 image with values in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    /// Flattened CHW data
    data: Vec<f32>,
}

impl ImageTensor {
    /// Build from an RGB image that is already 224×224
    pub fn from_rgb(img: &RgbImage) -> Result<Self> {
        let (width, height) = img.dimensions();
        if width as usize != IMAGE_SIZE || height as usize != IMAGE_SIZE {
            return Err(GrapeLeafError::InvalidImage(format!(
                "expected {}x{} pixels, got {}x{}",
                IMAGE_SIZE, IMAGE_SIZE, width, height
            )));
        }

        Ok(Self {
            data: to_chw(img),
        })
    }

    /// Tensor shape in CHW order
    pub fn shape(&self) -> [usize; 3] {
        [IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Value at channel `c`, row `y`, column `x`
    pub fn get(&self, c: usize, y: usize, x: usize) -> Option<f32> {
        if c >= IMAGE_CHANNELS || y >= IMAGE_SIZE || x >= IMAGE_SIZE {
            return None;
        }
        self.data.get(c * IMAGE_SIZE * IMAGE_SIZE + y * IMAGE_SIZE + x).copied()
    }

    /// Single-image batch `[1, 3, 224, 224]` on the given device
    pub fn to_batch<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::from_data(
            TensorData::new(self.data.clone(), [1, IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
            device,
        )
    }
}

/// Convert to RGB, resize to exactly 224×224 and rescale to [0, 1]
///
/// Aspect ratio is not preserved. Alpha is dropped and grayscale is expanded
/// to three channels.
pub fn preprocess_image(img: &DynamicImage) -> ImageTensor {
    ImageTensor {
        data: to_chw(&resize_rgb(img)),
    }
}

/// HWC bytes to CHW floats in [0, 1]; `img` must be 224×224
fn to_chw(img: &RgbImage) -> Vec<f32> {
    let plane = IMAGE_SIZE * IMAGE_SIZE;
    let mut data = vec![0.0f32; IMAGE_TENSOR_LEN];

    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * IMAGE_SIZE + x as usize;
        for c in 0..IMAGE_CHANNELS {
            data[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }

    data
}

/// RGB conversion plus the 224×224 resize, without rescaling
pub fn resize_rgb(img: &DynamicImage) -> RgbImage {
    let rgb = img.to_rgb8();
    if rgb.width() as usize == IMAGE_SIZE && rgb.height() as usize == IMAGE_SIZE {
        return rgb;
    }
    image::imageops::resize(&rgb, IMAGE_SIZE as u32, IMAGE_SIZE as u32, FilterType::Triangle)
}

/// Decode an uploaded image
///
/// Only JPEG and PNG are accepted. The format is sniffed from the bytes
/// themselves, never from a file name.
pub fn decode_upload(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(GrapeLeafError::InvalidImage("upload is empty".to_string()));
    }

    let format = image::guess_format(bytes)
        .map_err(|_| GrapeLeafError::InvalidImage("unrecognized image format".to_string()))?;

    match format {
        ImageFormat::Jpeg | ImageFormat::Png => {}
        other => {
            return Err(GrapeLeafError::InvalidImage(format!(
                "unsupported format {:?}, expected JPEG or PNG",
                other
            )))
        }
    }

    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| GrapeLeafError::InvalidImage(format!("failed to decode {:?}: {}", format, e)))
}

/// Decode and preprocess an uploaded image
pub fn preprocess_upload(bytes: &[u8]) -> Result<ImageTensor> {
    let img = decode_upload(bytes)?;
    Ok(preprocess_image(&img))
}
