//! Image preprocessing for in-process backends.
//!
//! Crops the object, resizes to the network input size and normalises with the
//! ImageNet statistics into a CHW `f32` buffer.

use crate::data::BoundingBox;
use crate::error::PoseError;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use std::path::Path;

pub const INPUT_SIZE: u32 = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Number of `f32` values in one preprocessed image.
pub const fn tensor_len() -> usize {
    3 * (INPUT_SIZE as usize) * (INPUT_SIZE as usize)
}

/// Crop `image` to `bbox`, clamped to the image bounds.
pub fn crop(image: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage, PoseError> {
    let (width, height) = (image.width() as f64, image.height() as f64);
    let left = bbox.left.clamp(0.0, width).floor();
    let upper = bbox.upper.clamp(0.0, height).floor();
    let right = bbox.right.clamp(0.0, width).ceil();
    let lower = bbox.lower.clamp(0.0, height).ceil();
    if right <= left || lower <= upper {
        return Err(PoseError::invalid_input(format!(
            "empty crop for bbox [{}, {}, {}, {}] in {}x{} image",
            bbox.left, bbox.upper, bbox.right, bbox.lower, width, height
        )));
    }
    Ok(image.crop_imm(
        left as u32,
        upper as u32,
        (right - left) as u32,
        (lower - upper) as u32,
    ))
}

/// Resize to the network input and normalise into CHW layout.
pub fn to_tensor(image: &DynamicImage) -> Vec<f32> {
    let rgb: RgbImage = image
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();
    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut out = vec![0.0f32; tensor_len()];
    for (idx, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            out[c * plane + idx] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    out
}

/// Load a test image, crop the annotated object and convert it to a tensor.
pub fn load_object(path: &Path, bbox: &BoundingBox) -> Result<Vec<f32>, PoseError> {
    let image = image::open(path)?;
    Ok(to_tensor(&crop(&image, bbox)?))
}

/// Load a rendered reference view (already centred on the object).
pub fn load_view(path: &Path) -> Result<Vec<f32>, PoseError> {
    Ok(to_tensor(&image::open(path)?))
}
