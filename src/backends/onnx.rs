//! ONNX Runtime backend
//!
//! Loads a catalog model file into an `ort` session and runs it with
//! positional inputs and outputs, so models exported with different tensor
//! names work the same way.

use crate::config::{ExecutionProvider, SessionConfig};
use crate::error::{RembgError, Result};
use crate::inference::InferenceBackend;
use ndarray::{Array4, Ix4};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::time::Instant;

/// ONNX Runtime backend for running background removal models
#[derive(Debug)]
pub struct OnnxBackend {
    session: Session,
    model_name: String,
}

impl OnnxBackend {
    /// Load a model file into a new ONNX Runtime session
    ///
    /// # Errors
    /// - Session builder configuration failures
    /// - Model file missing or not a valid ONNX graph
    pub fn load(model_name: &str, model_path: &Path, config: &SessionConfig) -> Result<Self> {
        let load_start = Instant::now();

        let mut session_builder = Session::builder()
            .map_err(|e| RembgError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                RembgError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    RembgError::inference(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (intra_threads / 4).max(1)
        };

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| RembgError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| RembgError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                RembgError::model(format!(
                    "Failed to load model '{model_name}' from '{}': {e}",
                    model_path.display()
                ))
            })?;

        log::debug!("ONNX Runtime session created");
        log::debug!("  - Model: {model_name} ({})", model_path.display());
        log::debug!("  - Requested provider: {}", config.execution_provider);
        log::debug!("  - Threading: {intra_threads} intra-op, {inter_threads} inter-op");
        log::info!(
            "Model '{model_name}' loaded in {:.0}ms",
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session,
            model_name: model_name.to_string(),
        })
    }

    /// Execution providers to register, CPU being implicit
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda_available =
            || OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available = || {
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
        };

        match requested {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                }
                providers
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    vec![CUDAExecutionProvider::default().build()]
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                    Vec::new()
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("Using CoreML execution provider");
                    vec![CoreMLExecutionProvider::default().with_subgraphs(true).build()]
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                    Vec::new()
                }
            },
        }
    }

    /// List execution providers with their availability
    pub fn list_providers() -> Vec<(String, bool)> {
        vec![
            ("CPU".to_string(), true),
            (
                "CUDA".to_string(),
                OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
                    .unwrap_or(false),
            ),
            (
                "CoreML".to_string(),
                OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false),
            ),
        ]
    }
}

impl InferenceBackend for OnnxBackend {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            RembgError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| RembgError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional access: the mask is always the first output
        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| RembgError::processing("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| RembgError::processing("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    RembgError::processing(format!("Failed to extract output tensor: {e}"))
                })?
        };

        let rank = output_tensor.ndim();
        let result = output_tensor
            .to_owned()
            .into_dimensionality::<Ix4>()
            .map_err(|_| {
                RembgError::processing(format!("Expected 4D output tensor, got {rank}D"))
            })?;

        log::info!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_provider_always_listed() {
        let providers = OnnxBackend::list_providers();
        assert_eq!(providers.first(), Some(&("CPU".to_string(), true)));
        assert_eq!(providers.len(), 3);
    }

    #[test]
    fn test_explicit_cpu_registers_nothing() {
        assert!(OnnxBackend::select_providers(ExecutionProvider::Cpu).is_empty());
    }

    #[test]
    fn test_missing_model_file_is_a_model_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent.onnx");
        let config = SessionConfig::default().with_execution_provider(ExecutionProvider::Cpu);

        let err = OnnxBackend::load("u2net", &missing, &config).unwrap_err();
        assert!(matches!(err, RembgError::Model(_)));
        assert!(err.to_string().contains("absent.onnx"));
    }
}
