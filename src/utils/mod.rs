//! Image-level helpers around inference

pub mod mask;
pub mod preprocessing;

pub use mask::MaskPostprocessor;
pub use preprocessing::ImagePreprocessor;
