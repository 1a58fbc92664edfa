use anyhow::{anyhow, Result};
use image::{imageops, ImageBuffer, Luma, RgbImage};
use ndarray::Array4;

use super::types::Matte;

/// Converts camera frames into model input tensors and model mattes back
/// into frame-sized masks
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            image
        };

        let shape = (1, 3, self.target_height as usize, self.target_width as usize);
        Array4::from_shape_fn(shape, |(_, c, y, x)| {
            source.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
    }

    /// Resize a model matte back to the frame it was computed for
    ///
    /// Values are kept as f32 throughout so soft edges survive the resize.
    pub fn postprocess_matte(
        matte: Vec<f32>,
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Matte> {
        let _span = tracing::debug_span!("postprocess").entered();

        if matte_width == target_width && matte_height == target_height {
            return Ok(matte);
        }

        let len = matte.len();
        let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(matte_width, matte_height, matte).ok_or_else(|| {
                anyhow!(
                    "matte of {} values does not fit {}x{}",
                    len,
                    matte_width,
                    matte_height
                )
            })?;

        let resized = imageops::resize(
            &buffer,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        Ok(resized
            .into_raw()
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0))
            .collect())
    }

    /// Convert matte to grayscale RGB image for visualization
    pub fn matte_to_rgb(matte: &[f32], width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let idx = (y * width + x) as usize;
            let value = matte
                .get(idx)
                .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
                .unwrap_or(0);
            image::Rgb([value, value, value])
        })
    }
}
