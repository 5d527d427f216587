//! Configuration types for session construction

use crate::error::{RembgError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable overriding the model home directory
pub const MODEL_HOME_ENV: &str = "U2NET_HOME";
/// Environment variable that disables verification of cached models when set
pub const CHECKSUM_DISABLED_ENV: &str = "MODEL_CHECKSUM_DISABLED";
/// Environment variable holding the intra-op thread count
pub const THREADS_ENV: &str = "OMP_NUM_THREADS";
/// Environment variable selecting the execution provider
pub const EXECUTION_PROVIDER_ENV: &str = "REMBG_EXECUTION_PROVIDER";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = RembgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(RembgError::invalid_config(format!(
                "Unknown execution provider '{other}'. Expected one of: auto, cpu, cuda, coreml"
            ))),
        }
    }
}

/// Settings used by the session factory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,
    /// Intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Inter-op threads (0 = auto)
    pub inter_threads: usize,
    /// Model home override (None = `~/.u2net`)
    pub model_home: Option<PathBuf>,
    /// Verify cached model files against their manifest before loading
    pub verify_checksums: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::Auto,
            intra_threads: 0,
            inter_threads: 0,
            model_home: None,
            verify_checksums: true,
        }
    }
}

impl SessionConfig {
    /// Build configuration from the process environment
    ///
    /// # Errors
    /// - Unparseable `REMBG_EXECUTION_PROVIDER` or `OMP_NUM_THREADS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    ///
    /// # Errors
    /// - Unparseable execution provider or thread count
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(home) = lookup(MODEL_HOME_ENV).filter(|value| !value.is_empty()) {
            config.model_home = Some(PathBuf::from(home));
        }

        if lookup(CHECKSUM_DISABLED_ENV).is_some() {
            config.verify_checksums = false;
        }

        if let Some(threads) = lookup(THREADS_ENV) {
            config.intra_threads = threads.trim().parse().map_err(|_| {
                RembgError::invalid_config(format!(
                    "{THREADS_ENV} must be a non-negative integer, got '{threads}'"
                ))
            })?;
        }

        if let Some(provider) = lookup(EXECUTION_PROVIDER_ENV) {
            config.execution_provider = provider.parse()?;
        }

        Ok(config)
    }

    pub fn with_execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.execution_provider = provider;
        self
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }

    pub fn with_inter_threads(mut self, threads: usize) -> Self {
        self.inter_threads = threads;
        self
    }

    pub fn with_model_home<P: Into<PathBuf>>(mut self, home: P) -> Self {
        self.model_home = Some(home.into());
        self
    }

    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.execution_provider, ExecutionProvider::Auto);
        assert_eq!(config.intra_threads, 0);
        assert!(config.model_home.is_none());
        assert!(config.verify_checksums);
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = SessionConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("U2NET_HOME", "/opt/models"),
            ("MODEL_CHECKSUM_DISABLED", "1"),
            ("OMP_NUM_THREADS", "4"),
            ("REMBG_EXECUTION_PROVIDER", "CPU"),
        ]))
        .unwrap();

        assert_eq!(config.model_home, Some(PathBuf::from("/opt/models")));
        assert!(!config.verify_checksums);
        assert_eq!(config.intra_threads, 4);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
    }

    #[test]
    fn test_empty_model_home_is_ignored() {
        let config = SessionConfig::from_lookup(lookup_from(&[("U2NET_HOME", "")])).unwrap();
        assert!(config.model_home.is_none());
    }

    #[test]
    fn test_invalid_thread_count() {
        let err = SessionConfig::from_lookup(lookup_from(&[("OMP_NUM_THREADS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("OMP_NUM_THREADS"));
    }

    #[test]
    fn test_execution_provider_parsing() {
        assert_eq!("auto".parse::<ExecutionProvider>().unwrap(), ExecutionProvider::Auto);
        assert_eq!("cuda".parse::<ExecutionProvider>().unwrap(), ExecutionProvider::Cuda);
        assert_eq!("CoreML".parse::<ExecutionProvider>().unwrap(), ExecutionProvider::CoreMl);
        assert!("tpu".parse::<ExecutionProvider>().is_err());
    }

    #[test]
    fn test_execution_provider_display_roundtrip() {
        for provider in [
            ExecutionProvider::Auto,
            ExecutionProvider::Cpu,
            ExecutionProvider::Cuda,
            ExecutionProvider::CoreMl,
        ] {
            assert_eq!(provider.to_string().parse::<ExecutionProvider>().unwrap(), provider);
        }
    }

    #[test]
    fn test_builder_methods() {
        let config = SessionConfig::default()
            .with_execution_provider(ExecutionProvider::Cuda)
            .with_intra_threads(8)
            .with_inter_threads(2)
            .with_model_home("/tmp/models")
            .with_checksum_verification(false);

        assert_eq!(config.execution_provider, ExecutionProvider::Cuda);
        assert_eq!(config.intra_threads, 8);
        assert_eq!(config.inter_threads, 2);
        assert_eq!(config.model_home, Some(PathBuf::from("/tmp/models")));
        assert!(!config.verify_checksums);
    }
}
