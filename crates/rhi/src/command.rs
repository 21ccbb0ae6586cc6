//! Command pool and command buffer management.
//!
//! This module provides wrappers for VkCommandPool and VkCommandBuffer,
//! plus the small builders used to assemble a `vkQueueSubmit2` call.
//!
//! # Overview
//!
//! - [`CommandPool`] owns a VkCommandPool and allocates buffers from it
//! - [`CommandBuffer`] wraps VkCommandBuffer with methods for recording commands
//! - [`command_buffer_submit_info`] / [`semaphore_submit_info`] build the
//!   synchronization-2 submit structures
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::command::{CommandPool, CommandBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), device.graphics_family())?;
//! let cmd = CommandBuffer::new(device.clone(), &pool)?;
//!
//! cmd.reset()?;
//! cmd.begin()?;
//! // ... record commands ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::deletion_queue::DeletionEntry;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan command pool wrapper.
///
/// A command pool is used to allocate command buffers. Each pool is associated
/// with a specific queue family and can only allocate command buffers that
/// will be submitted to queues of that family.
///
/// # Thread Safety
///
/// Command pools are not thread-safe. Each frame slot owns its own pool and
/// all recording happens on one thread.
pub struct CommandPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command pool handle. Null once handed to a deletion queue.
    pool: vk::CommandPool,
    /// Queue family index this pool belongs to.
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a new command pool for the specified queue family.
    ///
    /// The pool is created with the `RESET_COMMAND_BUFFER` flag, allowing
    /// individual command buffers to be reset without resetting the entire pool.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the queue family index this pool belongs to.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates a primary command buffer from this pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffer(&self) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        buffers
            .first()
            .copied()
            .ok_or(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
    }

    /// Gives up ownership so the pool (and every buffer allocated from it) is
    /// released by a deletion queue.
    pub fn into_deletion(mut self) -> DeletionEntry {
        DeletionEntry::CommandPool(std::mem::take(&mut self.pool))
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        if self.pool == vk::CommandPool::null() {
            return;
        }
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Vulkan command buffer wrapper.
///
/// Provides a safe interface for recording Vulkan commands. Commands are
/// recorded between `begin()` and `end()` calls.
///
/// # Note
///
/// The command buffer does NOT own the underlying VkCommandBuffer handle.
/// The handle is freed when the owning CommandPool is destroyed.
pub struct CommandBuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command buffer handle.
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates a new primary command buffer from the given pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate_command_buffer()?;
        Ok(Self { device, buffer })
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording for a single submission.
    ///
    /// # Errors
    ///
    /// Returns an error if beginning fails (e.g., if already recording).
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        Ok(())
    }

    /// Ends recording. The buffer is then ready for submission.
    ///
    /// # Errors
    ///
    /// Returns an error if ending fails (e.g., if not recording).
    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        Ok(())
    }

    /// Resets the command buffer to its initial state.
    ///
    /// The GPU must be done with the buffer; the frame loop guarantees this
    /// by waiting on the slot's fence first.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }

        Ok(())
    }

    // =========================================================================
    // Pipeline Binding
    // =========================================================================

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_pipeline(self.buffer, bind_point, pipeline);
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                bind_point,
                layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    // =========================================================================
    // Compute Commands
    // =========================================================================

    pub fn dispatch(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe {
            self.device.handle().cmd_dispatch(
                self.buffer,
                group_count_x,
                group_count_y,
                group_count_z,
            );
        }
    }

    // =========================================================================
    // Synchronization 2
    // =========================================================================

    /// Records a `vkCmdPipelineBarrier2` with the given image barriers.
    pub fn pipeline_barrier2(&self, image_barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(image_barriers);

        unsafe {
            self.device
                .handle()
                .cmd_pipeline_barrier2(self.buffer, &dependency_info);
        }
    }

    /// Records a `vkCmdBlitImage2`.
    pub fn blit_image2(&self, blit_info: &vk::BlitImageInfo2<'_>) {
        unsafe {
            self.device.handle().cmd_blit_image2(self.buffer, blit_info);
        }
    }
}

/// Describes one command buffer in a `vkQueueSubmit2` call.
pub fn command_buffer_submit_info(
    command_buffer: vk::CommandBuffer,
) -> vk::CommandBufferSubmitInfo<'static> {
    vk::CommandBufferSubmitInfo::default()
        .command_buffer(command_buffer)
        .device_mask(0)
}

/// Describes one semaphore wait or signal in a `vkQueueSubmit2` call.
pub fn semaphore_submit_info(
    stage_mask: vk::PipelineStageFlags2,
    semaphore: vk::Semaphore,
) -> vk::SemaphoreSubmitInfo<'static> {
    vk::SemaphoreSubmitInfo::default()
        .semaphore(semaphore)
        .stage_mask(stage_mask)
        .device_index(0)
        .value(1)
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_command_pool_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandPool>();
    }

    #[test]
    fn test_command_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
    }

    #[test]
    fn test_semaphore_submit_info_fields() {
        let sem = vk::Semaphore::from_raw(42);
        let info = semaphore_submit_info(vk::PipelineStageFlags2::ALL_GRAPHICS, sem);
        assert_eq!(info.semaphore, sem);
        assert_eq!(info.stage_mask, vk::PipelineStageFlags2::ALL_GRAPHICS);
        assert_eq!(info.value, 1);
        assert_eq!(info.device_index, 0);
    }

    #[test]
    fn test_command_buffer_submit_info_fields() {
        let cmd = vk::CommandBuffer::from_raw(7);
        let info = command_buffer_submit_info(cmd);
        assert_eq!(info.command_buffer, cmd);
        assert_eq!(info.device_mask, 0);
    }
}
