//! Backend implementations for different inference engines

#[cfg(feature = "onnx")]
pub mod onnx;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;
