//! Inference sessions for catalog models
//!
//! A session pairs a catalog entry with a loaded backend. Creating one makes
//! sure the model file is present in the model home, downloading it on first
//! use, and then hands the file to ONNX Runtime.

use crate::{
    cache::ModelCache,
    config::SessionConfig,
    download::ModelDownloader,
    error::Result,
    inference::InferenceBackend,
    models::{find_model, ModelDescriptor},
};
use std::path::PathBuf;

/// A loaded model, reusable across calls to [`crate::remove`]
pub struct Session {
    model: &'static ModelDescriptor,
    backend: Box<dyn InferenceBackend>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("model", &self.model.name)
            .field("backend", &self.backend.model_name())
            .finish()
    }
}

impl Session {
    /// Wrap an already loaded backend
    #[must_use]
    pub fn with_backend(model: &'static ModelDescriptor, backend: Box<dyn InferenceBackend>) -> Self {
        Self { model, backend }
    }

    #[must_use]
    pub fn model(&self) -> &'static ModelDescriptor {
        self.model
    }

    #[must_use]
    pub fn model_name(&self) -> &'static str {
        self.model.name
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn InferenceBackend {
        self.backend.as_mut()
    }
}

/// Create a session for a named model
///
/// # Errors
/// - Unknown model name
/// - Model home not usable, or download failure
/// - ONNX Runtime failed to load the model
/// - Built without the `onnx` feature
pub async fn new_session(model_name: &str, config: &SessionConfig) -> Result<Session> {
    let model = find_model(model_name)?;
    tracing::info!(model = model.name, provider = %config.execution_provider, "Creating session");

    #[cfg(feature = "onnx")]
    {
        let model_path = ensure_model(model, config, cfg!(feature = "cli")).await?;
        let backend = crate::backends::OnnxBackend::load(model.name, &model_path, config)?;
        Ok(Session::with_backend(model, Box::new(backend)))
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = config;
        Err(crate::error::RembgError::invalid_config(format!(
            "Cannot load model '{}': built without the `onnx` feature",
            model.name
        )))
    }
}

/// Make sure a model file is present in the model home and return its path
///
/// Cached files are reused. When checksum verification is enabled, a cached
/// file that no longer matches its manifest is downloaded again.
///
/// # Errors
/// - Model home not usable
/// - I/O errors while verifying the cached file
/// - Download failure
pub async fn ensure_model(
    model: &'static ModelDescriptor,
    config: &SessionConfig,
    show_progress: bool,
) -> Result<PathBuf> {
    let cache = ModelCache::new(config)?;
    let model_path = cache.model_path(model);

    if cache.is_model_cached(model) {
        if !config.verify_checksums {
            tracing::debug!(model = model.name, "Using cached model without verification");
            return Ok(model_path);
        }
        if cache.verify_cached_model(model)? {
            tracing::debug!(model = model.name, path = %model_path.display(), "Using cached model");
            return Ok(model_path);
        }
        tracing::warn!(model = model.name, "Cached model is corrupt, downloading again");
    }

    ModelDownloader::new(cache)?
        .download_model(model, show_progress)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backends::test_utils::{MockBackend, MockMask},
        cache::{file_sha256, CachedModelManifest},
        error::RembgError,
    };
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unknown_model_fails_before_touching_disk() {
        let temp_dir = TempDir::new().unwrap();
        let home = temp_dir.path().join("models");
        let config = SessionConfig::default().with_model_home(&home);

        let err = new_session("not-a-model", &config).await.unwrap_err();
        assert!(matches!(err, RembgError::UnsupportedModel { .. }));
        assert!(!home.exists());
    }

    #[tokio::test]
    async fn test_cached_model_is_reused() {
        let temp_dir = TempDir::new().unwrap();
        let model = find_model("u2netp").unwrap();
        let config = SessionConfig::default().with_model_home(temp_dir.path());

        let cached = temp_dir.path().join(model.file_name());
        std::fs::write(&cached, b"onnx bytes").unwrap();

        let path = ensure_model(model, &config, false).await.unwrap();
        assert_eq!(path, cached);
    }

    #[tokio::test]
    async fn test_verified_model_is_reused() {
        let temp_dir = TempDir::new().unwrap();
        let model = find_model("silueta").unwrap();
        let config = SessionConfig::default().with_model_home(temp_dir.path());
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();

        let cached = cache.model_path(model);
        std::fs::write(&cached, b"verified bytes").unwrap();
        let manifest = CachedModelManifest {
            model: model.name.to_string(),
            url: model.url(),
            sha256: file_sha256(&cached).unwrap(),
            size_bytes: 14,
            downloaded_at: chrono::Utc::now(),
        };
        cache.write_manifest(model, &manifest).unwrap();

        let path = ensure_model(model, &config, false).await.unwrap();
        assert_eq!(path, cached);
    }

    #[tokio::test]
    async fn test_corrupt_model_skipped_when_verification_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let model = find_model("u2net").unwrap();
        let config = SessionConfig::default()
            .with_model_home(temp_dir.path())
            .with_checksum_verification(false);
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();

        std::fs::write(cache.model_path(model), b"tampered").unwrap();
        let manifest = CachedModelManifest {
            model: model.name.to_string(),
            url: model.url(),
            sha256: "0".repeat(64),
            size_bytes: 8,
            downloaded_at: chrono::Utc::now(),
        };
        cache.write_manifest(model, &manifest).unwrap();

        let path = ensure_model(model, &config, false).await.unwrap();
        assert_eq!(path, cache.model_path(model));
    }

    #[test]
    fn test_session_with_backend() {
        let model = find_model("isnet-general-use").unwrap();
        let session = Session::with_backend(model, Box::new(MockBackend::new(MockMask::Disc)));

        assert_eq!(session.model_name(), "isnet-general-use");
        assert_eq!(session.model().preprocessing.target_size, 1024);
        assert!(format!("{session:?}").contains("mock-model"));
    }
}
