//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, RembgError>;

/// Error types for session construction and background removal
#[derive(Error, Debug)]
pub enum RembgError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// The requested model name is not in the catalog
    #[error("No session class found for model '{name}'. Available models: {available}")]
    UnsupportedModel { name: String, available: String },

    /// Model loading or validation errors
    #[error("Model error: {0}")]
    Model(String),

    /// Model download errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Tensor or mask processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RembgError {
    /// Create an unsupported model error listing the known names
    pub fn unsupported_model<S: Into<String>>(name: S, available: &[&str]) -> Self {
        Self::UnsupportedModel {
            name: name.into(),
            available: available.join(", "),
        }
    }

    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a network error wrapping the underlying cause
    pub fn network_error<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Network {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }
}
