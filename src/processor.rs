//! Background removal pipeline
//!
//! [`remove`] decodes image bytes, runs the session's model and returns the
//! cutout as PNG bytes. [`BackgroundRemover`] is the seam the CLI talks to;
//! [`OnnxRemover`] is the implementation backed by this crate's sessions.

use crate::{
    config::SessionConfig,
    error::Result,
    session::{self, Session},
    utils::{ImagePreprocessor, MaskPostprocessor},
};
use async_trait::async_trait;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;
use std::time::Instant;
use tracing::{instrument, span, Level};

/// Session factory plus removal function
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Loaded model handle passed back to [`BackgroundRemover::remove`]
    type Session: Send;

    /// Load a session for the named model
    ///
    /// # Errors
    /// - Unknown model name or model loading failure
    async fn new_session(&self, model_name: &str) -> Result<Self::Session>;

    /// Remove the background from encoded image bytes
    ///
    /// # Errors
    /// - Undecodable input, inference or encoding failures
    fn remove(&self, data: &[u8], session: &mut Self::Session) -> Result<Vec<u8>>;
}

/// [`BackgroundRemover`] backed by ONNX Runtime sessions
#[derive(Debug, Clone, Default)]
pub struct OnnxRemover {
    config: SessionConfig,
}

impl OnnxRemover {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Remover configured from the process environment
    ///
    /// # Errors
    /// - Unparseable environment values
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(SessionConfig::from_env()?))
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[async_trait]
impl BackgroundRemover for OnnxRemover {
    type Session = Session;

    async fn new_session(&self, model_name: &str) -> Result<Session> {
        session::new_session(model_name, &self.config).await
    }

    fn remove(&self, data: &[u8], session: &mut Session) -> Result<Vec<u8>> {
        remove(data, session)
    }
}

/// Remove the background from encoded image bytes
///
/// The input format is detected from its content and EXIF orientation is
/// applied before inference. The result is a PNG with the mask as alpha, at
/// the (oriented) input's size.
///
/// # Errors
/// - Unrecognized or corrupt image data
/// - Inference failures
/// - PNG encoding failures
#[instrument(skip(data, session), fields(model = session.model_name(), input_bytes = data.len()))]
pub fn remove(data: &[u8], session: &mut Session) -> Result<Vec<u8>> {
    let total_start = Instant::now();
    let image = decode_image(data)?;
    let original_dimensions = (image.width(), image.height());
    let model = session.model();

    tracing::debug!(
        width = original_dimensions.0,
        height = original_dimensions.1,
        "Decoded input image"
    );

    let input_tensor = ImagePreprocessor::preprocess_for_inference(&image, &model.preprocessing)?;

    let output_tensor = {
        let _span = span!(Level::INFO, "inference", model = model.name).entered();
        session.backend_mut().infer(&input_tensor)?
    };

    let mask = MaskPostprocessor::tensor_to_mask(&output_tensor, model.activation, original_dimensions)?;
    let cutout = {
        let _span = span!(Level::DEBUG, "background_removal").entered();
        MaskPostprocessor::apply_mask(&image, &mask)?
    };
    let png = MaskPostprocessor::encode_png(cutout)?;

    tracing::info!(
        output_bytes = png.len(),
        elapsed_ms = total_start.elapsed().as_millis() as u64,
        "Background removed"
    );
    Ok(png)
}

/// Decode image bytes and apply their EXIF orientation
fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}
