#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # rembg-lite
//!
//! Background removal for single images using the rembg model zoo on ONNX
//! Runtime, plus a minimal `rembg i` command-line front end.
//!
//! ## Features
//!
//! - **Model Zoo**: `u2net`, `u2netp`, `u2net_human_seg`, `silueta`, `ISNet` and `BiRefNet` models
//! - **Model Management**: Downloaded on first use into `$U2NET_HOME` (default `~/.u2net`)
//!   and verified against a SHA-256 manifest afterwards
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **PNG Output**: Cutouts are RGBA PNG with the predicted mask as alpha
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rembg_lite::{new_session, remove, SessionConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SessionConfig::from_env()?;
//! let mut session = new_session("u2net", &config).await?;
//!
//! let input = std::fs::read("input.jpg")?;
//! let output = remove(&input, &mut session)?;
//! std::fs::write("output.png", output)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `cli` (default): The `rembg` binary, progress bars and log output
//! - `webp-support` (default): WebP input decoding
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod utils;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedModelManifest, ModelCache};
pub use config::{ExecutionProvider, SessionConfig};
pub use download::ModelDownloader;
pub use error::{RembgError, Result};
pub use inference::InferenceBackend;
pub use models::{find_model, model_names, ModelDescriptor, DEFAULT_MODEL, MODEL_CATALOG};
pub use processor::{remove, BackgroundRemover, OnnxRemover};
pub use session::{ensure_model, new_session, Session};
pub use utils::{ImagePreprocessor, MaskPostprocessor};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};
