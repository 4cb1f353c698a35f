//! Renderer error types.

use ash::vk;
use thiserror::Error;

/// Errors reported by the render device.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Failed to initialize renderer: {0}")]
    InitializationFailed(String),
    #[error("No discrete GPU with distinct graphics, compute and transfer queue families")]
    NoSuitableDevice,
    #[error("Physical device is missing a {0} queue family")]
    MissingQueueFamily(&'static str),
    #[error("No supported depth/stencil attachment format")]
    NoDepthFormat,
    #[error("Failed to create swapchain: {0}")]
    SwapchainCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to load shader binary {path}: {reason}")]
    ShaderLoadFailed { path: String, reason: String },
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("GPU memory allocation failed: {0}")]
    AllocationFailed(#[from] gpu_allocator::AllocationError),
    #[error("Failed to load texture {path}: {reason}")]
    TextureLoadFailed { path: String, reason: String },
    #[error("Failed to acquire next image: {0}")]
    AcquireFailed(vk::Result),
    #[error("Failed to submit frame: {0}")]
    SubmitFailed(vk::Result),
    #[error("Failed to present: {0}")]
    PresentFailed(vk::Result),
    #[error("{pool} pool exhausted (capacity {capacity})")]
    PoolExhausted { pool: &'static str, capacity: usize },
    #[error("Invalid {pool} handle {index}")]
    InvalidHandle { pool: &'static str, index: u32 },
    #[error("Draw item limit of {limit} per frame exceeded")]
    DrawItemLimitExceeded { limit: u32 },
    #[error("Render pass limit of {limit} per frame exceeded")]
    RenderPassLimitExceeded { limit: u32 },
    #[error("No render pass has begun in this frame")]
    RenderPassNotStarted,
    #[error("No frame is being recorded")]
    FrameNotStarted,
    #[error("A frame is already being recorded")]
    FrameAlreadyStarted,
    #[error("Illegal image layout transition {from:?} -> {to:?}")]
    IllegalLayoutTransition {
        from: crate::vulkan::layout::ImageLayoutState,
        to: crate::vulkan::layout::ImageLayoutState,
    },
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
}

pub type RendererResult<T> = Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::layout::ImageLayoutState;

    #[test]
    fn test_error_display() {
        let err = RendererError::PoolExhausted {
            pool: "texture",
            capacity: 32,
        };
        assert_eq!(err.to_string(), "texture pool exhausted (capacity 32)");

        let err = RendererError::IllegalLayoutTransition {
            from: ImageLayoutState::Undefined,
            to: ImageLayoutState::ShaderReadOnly,
        };
        assert_eq!(
            err.to_string(),
            "Illegal image layout transition Undefined -> ShaderReadOnly"
        );
    }

    #[test]
    fn test_vk_result_converts() {
        let err: RendererError = vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(err, RendererError::Vulkan(vk::Result::ERROR_DEVICE_LOST)));
    }
}
