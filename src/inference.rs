//! Inference backend abstraction

use crate::error::Result;
use ndarray::Array4;

/// A loaded model that maps an NCHW image tensor to an NCHW mask tensor
pub trait InferenceBackend: Send {
    /// Run inference on the input tensor
    ///
    /// # Errors
    /// - Tensor conversion failures
    /// - Model inference failures
    /// - Output that is not a 4D `f32` tensor
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Session name of the loaded model
    fn model_name(&self) -> &str;
}
