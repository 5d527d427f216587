//! Image preprocessing for model inference

use crate::{
    error::{RembgError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Lower bound for the brightness divisor so black images do not divide by zero
const MIN_PIXEL_MAX: f32 = 1e-6;

/// Turns decoded images into normalized NCHW tensors
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image for model inference
    ///
    /// The image is converted to RGB and resized (without preserving aspect
    /// ratio) to the model's square input. Pixel values are divided by the
    /// brightest channel value in the resized image, then normalized with the
    /// model's per-channel mean and standard deviation.
    ///
    /// # Errors
    /// - Zero-sized input image
    /// - Zero target size or zero standard deviation in the config
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let target_size = preprocessing_config.target_size;
        if image.width() == 0 || image.height() == 0 {
            return Err(RembgError::processing("Input image has zero width or height"));
        }
        if target_size == 0 {
            return Err(RembgError::invalid_config("Model input size must be positive"));
        }
        if preprocessing_config
            .normalization_std
            .iter()
            .any(|std| *std == 0.0)
        {
            return Err(RembgError::invalid_config(
                "Normalization standard deviation must be non-zero",
            ));
        }

        let _span = tracing::debug_span!(
            "preprocessing",
            original_width = image.width(),
            original_height = image.height(),
            target_size
        )
        .entered();

        let resized = image::imageops::resize(
            &image.to_rgb8(),
            target_size,
            target_size,
            FilterType::Lanczos3,
        );

        Ok(Self::image_to_tensor(&resized, preprocessing_config))
    }

    /// Convert a square RGB image to a normalized tensor
    fn image_to_tensor(image: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let size = image.width() as usize;
        let max_value = image
            .as_raw()
            .iter()
            .copied()
            .max()
            .map_or(MIN_PIXEL_MAX, |max| f32::from(max).max(MIN_PIXEL_MAX));

        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in image.enumerate_pixels() {
            for (channel, value) in pixel.0.iter().enumerate() {
                let normalized =
                    (f32::from(*value) / max_value - mean[channel]) / std[channel];
                if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *slot = normalized;
                }
            }
        }

        tensor
    }
}
