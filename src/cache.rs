//! Model home management
//!
//! Downloaded models live as flat files in the model home directory
//! (`$U2NET_HOME` or `~/.u2net`), one `<name>.onnx` per model, each with a
//! `<name>.onnx.json` manifest recording its origin and SHA-256 digest.

use crate::config::{SessionConfig, MODEL_HOME_ENV};
use crate::error::{RembgError, Result};
use crate::models::ModelDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Directory name used under the user's home when no override is set
const DEFAULT_HOME_DIR: &str = ".u2net";

/// Side-car metadata written next to a downloaded model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedModelManifest {
    /// Session name of the model
    pub model: String,
    /// URL the file was downloaded from
    pub url: String,
    /// Lowercase hex SHA-256 of the model file
    pub sha256: String,
    pub size_bytes: u64,
    pub downloaded_at: DateTime<Utc>,
}

/// Model home manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    home: PathBuf,
}

impl ModelCache {
    /// Open the model home described by `config`, creating it if missing
    ///
    /// # Errors
    /// - No home directory could be determined and no override was given
    /// - Failed to create the directory
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let home = match &config.model_home {
            Some(home) => home.clone(),
            None => Self::default_home()?,
        };
        Self::with_custom_cache_dir(&home)
    }

    /// Open a model home at an explicit path, creating it if missing
    ///
    /// # Errors
    /// - Failed to create the directory
    pub fn with_custom_cache_dir(home: &Path) -> Result<Self> {
        if !home.exists() {
            fs::create_dir_all(home)
                .map_err(|e| RembgError::file_io_error("create model home", home, &e))?;
        }

        Ok(Self {
            home: home.to_path_buf(),
        })
    }

    fn default_home() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_HOME_DIR))
            .ok_or_else(|| {
                RembgError::invalid_config(format!(
                    "Failed to determine home directory. Set {MODEL_HOME_ENV} environment variable."
                ))
            })
    }

    /// Directory holding the model files
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Path of the model file (may not exist)
    #[must_use]
    pub fn model_path(&self, model: &ModelDescriptor) -> PathBuf {
        self.home.join(model.file_name())
    }

    /// Path of the manifest side-car (may not exist)
    #[must_use]
    pub fn manifest_path(&self, model: &ModelDescriptor) -> PathBuf {
        self.home.join(format!("{}.json", model.file_name()))
    }

    /// Whether a non-empty model file is present
    #[must_use]
    pub fn is_model_cached(&self, model: &ModelDescriptor) -> bool {
        fs::metadata(self.model_path(model)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    /// Read the manifest for a model, if one was written
    ///
    /// # Errors
    /// - Manifest exists but cannot be read or parsed
    pub fn read_manifest(&self, model: &ModelDescriptor) -> Result<Option<CachedModelManifest>> {
        let path = self.manifest_path(model);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| RembgError::file_io_error("read model manifest", &path, &e))?;
        let manifest = serde_json::from_str(&content).map_err(|e| {
            RembgError::model(format!(
                "Corrupt model manifest '{}': {e}",
                path.display()
            ))
        })?;

        Ok(Some(manifest))
    }

    /// Write the manifest for a model
    ///
    /// # Errors
    /// - Serialization or file write failures
    pub fn write_manifest(&self, model: &ModelDescriptor, manifest: &CachedModelManifest) -> Result<()> {
        let path = self.manifest_path(model);
        let content = serde_json::to_string_pretty(manifest)
            .map_err(|e| RembgError::model(format!("Failed to serialize manifest: {e}")))?;

        fs::write(&path, content)
            .map_err(|e| RembgError::file_io_error("write model manifest", &path, &e))
    }

    /// Check a cached model file against its manifest
    ///
    /// Files without a manifest (placed by hand or by another tool) are
    /// accepted as-is.
    ///
    /// # Errors
    /// - I/O errors while hashing the file
    /// - Corrupt manifest
    pub fn verify_cached_model(&self, model: &ModelDescriptor) -> Result<bool> {
        let Some(manifest) = self.read_manifest(model)? else {
            tracing::debug!(model = model.name, "No manifest for cached model, skipping verification");
            return Ok(true);
        };

        let path = self.model_path(model);
        let size = fs::metadata(&path)
            .map_err(|e| RembgError::file_io_error("inspect cached model", &path, &e))?
            .len();
        if size != manifest.size_bytes {
            tracing::warn!(
                model = model.name,
                expected = manifest.size_bytes,
                actual = size,
                "Cached model size does not match manifest"
            );
            return Ok(false);
        }

        let actual = file_sha256(&path)?;
        if actual != manifest.sha256 {
            tracing::warn!(
                model = model.name,
                expected = %manifest.sha256,
                actual = %actual,
                "Cached model checksum does not match manifest"
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Remove a cached model and its manifest
    ///
    /// # Returns
    /// `true` if a model file was removed
    ///
    /// # Errors
    /// - Failed to delete an existing file
    pub fn remove_model(&self, model: &ModelDescriptor) -> Result<bool> {
        let manifest_path = self.manifest_path(model);
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)
                .map_err(|e| RembgError::file_io_error("remove model manifest", &manifest_path, &e))?;
        }

        let model_path = self.model_path(model);
        if !model_path.exists() {
            return Ok(false);
        }

        tracing::info!(model = model.name, "Removing cached model");
        fs::remove_file(&model_path)
            .map_err(|e| RembgError::file_io_error("remove cached model", &model_path, &e))?;
        Ok(true)
    }
}

/// Lowercase hex SHA-256 of a file's contents
///
/// # Errors
/// - Failed to open or read the file
pub fn file_sha256(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .map_err(|e| RembgError::file_io_error("open file for verification", path, &e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)
        .map_err(|e| RembgError::file_io_error("read file for verification", path, &e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
