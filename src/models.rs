//! Model catalog
//!
//! Every session name accepted by `--model` maps to a [`ModelDescriptor`]
//! describing where the ONNX file comes from and how images have to be
//! prepared for it.

use crate::error::{RembgError, Result};

/// Model used when `--model` is not given
pub const DEFAULT_MODEL: &str = "u2net";

/// Base URL of the upstream model release assets
pub const MODEL_RELEASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const ISNET_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const ISNET_STD: [f32; 3] = [1.0, 1.0, 1.0];

/// How raw model output is turned into a 0..=1 mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskActivation {
    /// Rescale to the output's own min/max range
    MinMax,
    /// Apply a sigmoid, then rescale to min/max
    SigmoidMinMax,
}

/// Image preparation parameters for a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Square input resolution expected by the model
    pub target_size: u32,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Static description of a downloadable model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelDescriptor {
    /// Session name as passed to `--model`
    pub name: &'static str,
    /// Asset file name in the upstream release
    pub asset: &'static str,
    pub preprocessing: PreprocessingConfig,
    pub activation: MaskActivation,
}

impl ModelDescriptor {
    const fn u2net_family(name: &'static str, asset: &'static str) -> Self {
        Self {
            name,
            asset,
            preprocessing: PreprocessingConfig {
                target_size: 320,
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            },
            activation: MaskActivation::MinMax,
        }
    }

    const fn isnet_family(name: &'static str, asset: &'static str) -> Self {
        Self {
            name,
            asset,
            preprocessing: PreprocessingConfig {
                target_size: 1024,
                normalization_mean: ISNET_MEAN,
                normalization_std: ISNET_STD,
            },
            activation: MaskActivation::MinMax,
        }
    }

    const fn birefnet_family(name: &'static str, asset: &'static str) -> Self {
        Self {
            name,
            asset,
            preprocessing: PreprocessingConfig {
                target_size: 1024,
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            },
            activation: MaskActivation::SigmoidMinMax,
        }
    }

    /// Download URL of the model file
    #[must_use]
    pub fn url(&self) -> String {
        format!("{MODEL_RELEASE_URL}/{}", self.asset)
    }

    /// File name used in the model home directory
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.onnx", self.name)
    }
}

/// All models known to the session factory
pub static MODEL_CATALOG: &[ModelDescriptor] = &[
    ModelDescriptor::u2net_family("u2net", "u2net.onnx"),
    ModelDescriptor::u2net_family("u2netp", "u2netp.onnx"),
    ModelDescriptor::u2net_family("u2net_human_seg", "u2net_human_seg.onnx"),
    ModelDescriptor::u2net_family("silueta", "silueta.onnx"),
    ModelDescriptor::isnet_family("isnet-general-use", "isnet-general-use.onnx"),
    ModelDescriptor::isnet_family("isnet-anime", "isnet-anime.onnx"),
    ModelDescriptor::birefnet_family("birefnet-general", "BiRefNet-general-epoch_244.onnx"),
    ModelDescriptor::birefnet_family(
        "birefnet-general-lite",
        "BiRefNet-general-bb_swin_v1_tiny-epoch_232.onnx",
    ),
    ModelDescriptor::birefnet_family("birefnet-portrait", "BiRefNet-portrait-epoch_150.onnx"),
    ModelDescriptor::birefnet_family("birefnet-dis", "BiRefNet-DIS-epoch_590.onnx"),
    ModelDescriptor::birefnet_family("birefnet-hrsod", "BiRefNet-HRSOD_DHU-epoch_115.onnx"),
    ModelDescriptor::birefnet_family("birefnet-cod", "BiRefNet-COD-epoch_125.onnx"),
    ModelDescriptor::birefnet_family(
        "birefnet-massive",
        "BiRefNet-massive-TR_DIS5K_TR_TEs-epoch_420.onnx",
    ),
];

/// Names of all catalog models, in catalog order
#[must_use]
pub fn model_names() -> Vec<&'static str> {
    MODEL_CATALOG.iter().map(|model| model.name).collect()
}

/// Look up a model by session name
///
/// # Errors
/// - `UnsupportedModel` when the name is not in the catalog
pub fn find_model(name: &str) -> Result<&'static ModelDescriptor> {
    MODEL_CATALOG
        .iter()
        .find(|model| model.name == name)
        .ok_or_else(|| RembgError::unsupported_model(name, &model_names()))
}
