use std::path::PathBuf;

use thiserror::Error;
use vulkanalia::vk;

/// Unrecoverable failures raised by the engine.
///
/// These travel inside `anyhow::Error`; use `downcast_ref::<EngineError>()`
/// to inspect the kind.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to find suitable physical device.")]
    NoSuitableDevice,
    #[error("Failed to find suitable memory type (type bits {type_bits:#034b}, properties {properties:?}).")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },
    #[error("Surface does not offer B8G8R8A8_SRGB with SRGB_NONLINEAR color space.")]
    NoSuitableFormat,
    #[error("Unsupported layout transition ({old:?} -> {new:?}).")]
    UnsupportedTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
    #[error("Failed to create graphics pipeline: {0}")]
    PipelineCreation(vk::ErrorCode),
    #[error("Failed to acquire swapchain image: {0}")]
    SurfaceAcquire(String),
    #[error("Failed to present swapchain image: {0}")]
    SurfacePresent(vk::ErrorCode),
    #[error("Validation layer requested but not supported.")]
    MissingValidationLayer,
    #[error("Failed to load shader `{}`: {reason}", path.display())]
    ShaderLoad { path: PathBuf, reason: String },
    #[error("Failed to load texture `{}`: {reason}", path.display())]
    TextureLoad { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_asset() {
        let error = EngineError::ShaderLoad {
            path: PathBuf::from("shaders/vert.spv"),
            reason: "No such file or directory".into(),
        };

        assert_eq!(
            error.to_string(),
            "Failed to load shader `shaders/vert.spv`: No such file or directory"
        );
    }

    #[test]
    fn downcasts_through_anyhow() {
        let error = anyhow::Error::from(EngineError::NoSuitableFormat);

        assert!(matches!(
            error.downcast_ref::<EngineError>(),
            Some(EngineError::NoSuitableFormat)
        ));
    }
}
