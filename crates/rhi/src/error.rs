//! RHI-specific error types.
//!
//! [`RhiError`] is the fatal channel of the GPU layer. Outcomes the frame loop
//! is expected to survive (fence timeouts, acquire timeouts, out-of-date
//! swapchains) are not errors; they are returned as values such as
//! [`crate::sync::WaitOutcome`] and [`crate::swapchain::AcquireOutcome`].

use ash::vk;
use thiserror::Error;

use crate::shader::ShaderLoadError;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A shader binary could not be turned into a module.
    #[error("Shader error: {0}")]
    ShaderLoad(#[from] ShaderLoadError),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// The descriptor pool has handed out every set it was created for.
    #[error("Descriptor pool exhausted: all {max_sets} sets allocated")]
    DescriptorSetsExhausted { max_sets: u32 },

    /// The descriptor pool has no reserved capacity left for a type.
    #[error(
        "Descriptor pool exhausted for {descriptor_type:?}: requested {requested}, {available} left"
    )]
    DescriptorPoolExhausted {
        descriptor_type: vk::DescriptorType,
        requested: u32,
        available: u32,
    },

    /// An owning wrapper was asked to release a handle it already released.
    #[error("{0} was already destroyed")]
    AlreadyDestroyed(&'static str),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_result_converts() {
        let err: RhiError = vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(err, RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)));
    }

    #[test]
    fn test_pool_exhausted_message_names_type() {
        let err = RhiError::DescriptorPoolExhausted {
            descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
            requested: 1,
            available: 0,
        };
        let msg = err.to_string();
        assert!(msg.contains("STORAGE_IMAGE"));
        assert!(msg.contains("requested 1"));
    }
}
