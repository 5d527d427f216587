//! Mock backend for exercising the removal pipeline without model files
//! or ONNX Runtime.

use crate::{
    error::{RembgError, Result},
    inference::InferenceBackend,
};
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Shape of the mask the mock produces
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockMask {
    /// Soft disc centred in the frame, raw values in 0..=1
    Disc,
    /// Left half foreground, right half background
    LeftHalf,
    /// Same value everywhere
    Constant(f32),
}

/// Mock inference backend producing synthetic masks
#[derive(Debug, Clone)]
pub struct MockBackend {
    model_name: String,
    mask: MockMask,
    /// Input shapes seen by `infer`, for verification in tests
    calls: Arc<Mutex<Vec<Vec<usize>>>>,
    should_fail_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new(mask: MockMask) -> Self {
        Self {
            model_name: "mock-model".to_string(),
            mask,
            calls: Arc::new(Mutex::new(Vec::new())),
            should_fail_inference: false,
        }
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new(MockMask::Disc);
        backend.should_fail_inference = true;
        backend
    }

    /// Shared handle on the recorded input shapes
    #[must_use]
    pub fn calls(&self) -> Arc<Mutex<Vec<Vec<usize>>>> {
        Arc::clone(&self.calls)
    }

    fn generate_mask(&self, height: usize, width: usize) -> Array4<f32> {
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(1.0);

        Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| match self.mask {
            MockMask::Disc => {
                let dx = x as f32 - center_x;
                let dy = y as f32 - center_y;
                let distance = (dx * dx + dy * dy).sqrt();
                ((radius - distance) / radius).clamp(0.0, 1.0)
            },
            MockMask::LeftHalf => {
                if x < width / 2 {
                    1.0
                } else {
                    0.0
                }
            },
            MockMask::Constant(value) => value,
        })
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(input.shape().to_vec());
        }

        if self.should_fail_inference {
            return Err(RembgError::inference("Mock backend inference failed"));
        }

        let (_, channels, height, width) = input.dim();
        if channels != 3 {
            return Err(RembgError::processing(format!(
                "Mock backend expects 3 input channels, got {channels}"
            )));
        }

        Ok(self.generate_mask(height, width))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_input_shape() {
        let mut backend = MockBackend::new(MockMask::Disc);
        let calls = backend.calls();

        let output = backend.infer(&Array4::zeros((1, 3, 32, 32))).unwrap();
        assert_eq!(output.dim(), (1, 1, 32, 32));
        assert_eq!(calls.lock().unwrap().as_slice(), &[vec![1, 3, 32, 32]]);
    }

    #[test]
    fn test_mock_rejects_wrong_channel_count() {
        let mut backend = MockBackend::new(MockMask::Disc);
        assert!(backend.infer(&Array4::zeros((1, 1, 8, 8))).is_err());
    }

    #[test]
    fn test_mock_failing_inference() {
        let mut backend = MockBackend::new_failing_inference();
        let err = backend.infer(&Array4::zeros((1, 3, 8, 8))).unwrap_err();
        assert!(matches!(err, RembgError::Inference(_)));
    }

    #[test]
    fn test_left_half_mask() {
        let mut backend = MockBackend::new(MockMask::LeftHalf);
        let output = backend.infer(&Array4::zeros((1, 3, 4, 4))).unwrap();
        assert!((output[[0, 0, 0, 0]] - 1.0).abs() < f32::EPSILON);
        assert!(output[[0, 0, 0, 3]].abs() < f32::EPSILON);
    }
}
