//! Image decoding and tensor preparation.
//!
//! Every image is forced to RGB, resized to a square without preserving the
//! aspect ratio, and scaled from `[0, 255]` to `[0, 1]`.

use image::imageops::FilterType;
use image::RgbImage;

use crate::error::{FakelensError, Result};

/// Spatial resolution the classifier is trained and served at.
pub const IMAGE_SIZE: usize = 128;
/// RGB
pub const CHANNELS: usize = 3;

/// Batch of one image laid out as `[1, height, width, channels]` (NHWC).
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedTensor {
    data: Vec<f32>,
    size: usize,
}

impl PreprocessedTensor {
    /// Scale an RGB image into a single-image batch.
    pub fn from_rgb(img: &RgbImage) -> Result<Self> {
        let (width, height) = img.dimensions();
        if width != height {
            return Err(FakelensError::Validation(format!(
                "expected a square image, got {width}x{height}"
            )));
        }
        let data = img
            .pixels()
            .flat_map(|p| p.0.iter().map(|&c| c as f32 / 255.0))
            .collect();
        Ok(Self {
            data,
            size: width as usize,
        })
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, self.size, self.size, CHANNELS]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Decode arbitrary image bytes into a `size`x`size` RGB image.
pub fn decode_rgb(bytes: &[u8], size: usize) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes)?;
    let side = size as u32;
    Ok(img.resize_exact(side, side, FilterType::CatmullRom).to_rgb8())
}

/// Decode and scale image bytes into a model-ready tensor.
pub fn preprocess_image(bytes: &[u8], size: usize) -> Result<PreprocessedTensor> {
    let rgb = decode_rgb(bytes, size)?;
    PreprocessedTensor::from_rgb(&rgb)
}
