//! Mask postprocessing and cutout

use crate::{
    error::{RembgError, Result},
    models::MaskActivation,
};
use image::{imageops::FilterType, DynamicImage, GrayImage, ImageFormat, Luma, RgbaImage};
use ndarray::{s, Array2, Array4};
use std::io::Cursor;

/// Output ranges narrower than this are treated as flat
const FLAT_RANGE_EPSILON: f32 = 1e-6;

/// Converts model output into masks and applies them
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Turn the first channel of a `1xCxHxW` output into an 8-bit mask at
    /// the original image size
    ///
    /// # Errors
    /// - Output tensor with a batch size other than 1, no channels, or empty planes
    /// - Zero-sized target dimensions
    pub fn tensor_to_mask(
        tensor: &Array4<f32>,
        activation: MaskActivation,
        original_dimensions: (u32, u32),
    ) -> Result<GrayImage> {
        let (batch, channels, height, width) = tensor.dim();
        if batch != 1 || channels == 0 || height == 0 || width == 0 {
            return Err(RembgError::processing(format!(
                "Invalid output tensor shape {:?}, expected [1, C, H, W]",
                tensor.shape()
            )));
        }
        let (orig_width, orig_height) = original_dimensions;
        if orig_width == 0 || orig_height == 0 {
            return Err(RembgError::processing("Cannot resize mask to a zero-sized image"));
        }

        let _span = tracing::debug_span!("postprocessing", ?activation, height, width).entered();

        let mut plane: Array2<f32> = tensor.slice(s![0, 0, .., ..]).to_owned();
        if activation == MaskActivation::SigmoidMinMax {
            plane.mapv_inplace(sigmoid);
        }
        Self::normalize_min_max(&mut plane);

        let mask_width = u32::try_from(width)
            .map_err(|_| RembgError::processing("Mask width exceeds u32 range"))?;
        let mask_height = u32::try_from(height)
            .map_err(|_| RembgError::processing("Mask height exceeds u32 range"))?;

        let mask = GrayImage::from_fn(mask_width, mask_height, |x, y| {
            let value = plane
                .get([y as usize, x as usize])
                .copied()
                .unwrap_or(0.0);
            Luma([(value.clamp(0.0, 1.0) * 255.0) as u8])
        });

        if (mask_width, mask_height) == original_dimensions {
            return Ok(mask);
        }
        Ok(image::imageops::resize(
            &mask,
            orig_width,
            orig_height,
            FilterType::Lanczos3,
        ))
    }

    /// Rescale values to 0..=1 using their own range
    ///
    /// A flat plane carries no contrast to stretch; its values are only
    /// clamped.
    fn normalize_min_max(plane: &mut Array2<f32>) {
        let (min, max) = plane
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), value| {
                (min.min(*value), max.max(*value))
            });

        let range = max - min;
        if !range.is_finite() || range < FLAT_RANGE_EPSILON {
            plane.mapv_inplace(|value| value.clamp(0.0, 1.0));
        } else {
            plane.mapv_inplace(|value| (value - min) / range);
        }
    }

    /// Cut the foreground out of an image using a mask of the same size
    ///
    /// Composites the image over a fully transparent background: every
    /// channel, color and alpha alike, is scaled by `mask / 255`. Already
    /// transparent pixels therefore stay transparent, and pixels that end up
    /// with zero alpha are zeroed entirely.
    ///
    /// # Errors
    /// - Mask dimensions differ from the image
    pub fn apply_mask(image: &DynamicImage, mask: &GrayImage) -> Result<RgbaImage> {
        let mut rgba = image.to_rgba8();
        if rgba.dimensions() != mask.dimensions() {
            return Err(RembgError::processing(format!(
                "Mask size {:?} does not match image size {:?}",
                mask.dimensions(),
                rgba.dimensions()
            )));
        }

        for (pixel, mask_pixel) in rgba.pixels_mut().zip(mask.pixels()) {
            let weight = u16::from(mask_pixel[0]);
            for channel in &mut pixel.0 {
                *channel = ((u16::from(*channel) * weight + 127) / 255) as u8;
            }
            if pixel[3] == 0 {
                *pixel = image::Rgba([0, 0, 0, 0]);
            }
        }

        Ok(rgba)
    }

    /// Encode an RGBA image as PNG bytes
    ///
    /// # Errors
    /// - PNG encoder failures
    pub fn encode_png(image: RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }
}

fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}
