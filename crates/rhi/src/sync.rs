//! Synchronization primitives for Vulkan.
//!
//! This module provides wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//!
//! # Overview
//!
//! - **Semaphores** order queue operations without CPU involvement, e.g. the
//!   "image acquired" and "render finished" signals of a frame.
//!
//! - **Fences** let the CPU block until submitted work completes. A frame slot
//!   is only reused once its fence has signaled.
//!
//! A fence wait that runs out of time is not an error: [`Fence::wait_for`]
//! reports it as [`WaitOutcome::TimedOut`] and leaves the policy to the caller.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::sync::{Fence, Semaphore, WaitOutcome};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let image_acquired = Semaphore::new(device.clone())?;
//!
//! // Signaled so the first wait returns immediately
//! let render_fence = Fence::new(device.clone(), true)?;
//!
//! match render_fence.wait_for(1_000_000_000)? {
//!     WaitOutcome::Signaled => render_fence.reset()?,
//!     WaitOutcome::TimedOut => tracing::warn!("GPU is running behind"),
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::deletion_queue::DeletionEntry;
use crate::device::Device;
use crate::error::RhiResult;

/// Result of a bounded fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The fence was signaled within the timeout.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
}

impl WaitOutcome {
    /// Maps the raw result of `vkWaitForFences`.
    ///
    /// `TIMEOUT` is an outcome; every other failure is returned as an error.
    pub fn from_wait_result(result: Result<(), vk::Result>) -> Result<Self, vk::Result> {
        match result {
            Ok(()) => Ok(Self::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(Self::TimedOut),
            Err(e) => Err(e),
        }
    }
}

/// Vulkan semaphore wrapper.
///
/// Semaphores are used for GPU-to-GPU synchronization between queue operations.
/// The renderer uses two per frame slot: one signaled by image acquisition and
/// one signaled when the frame's commands complete.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle. Null once handed to a deletion queue.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Gives up ownership so the semaphore is released by a deletion queue.
    pub fn into_deletion(mut self) -> DeletionEntry {
        DeletionEntry::Semaphore(std::mem::take(&mut self.semaphore))
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        if self.semaphore == vk::Semaphore::null() {
            return;
        }
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
///
/// Fences are used for GPU-to-CPU synchronization, allowing the host to wait
/// for GPU operations to complete.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle. Null once handed to a deletion queue.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, creates the fence in the signaled state so the
    ///   first wait on it does not block.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout_ns` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than the timeout, e.g. device
    /// loss.
    pub fn wait_for(&self, timeout_ns: u64) -> RhiResult<WaitOutcome> {
        let fences = [self.fence];
        let result = unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout_ns)
        };
        Ok(WaitOutcome::from_wait_result(result)?)
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any queue operation when this is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset operation fails.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Checks if the fence is currently signaled without blocking.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }

    /// Gives up ownership so the fence is released by a deletion queue.
    pub fn into_deletion(mut self) -> DeletionEntry {
        DeletionEntry::Fence(std::mem::take(&mut self.fence))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        if self.fence == vk::Fence::null() {
            return;
        }
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_success_is_signaled() {
        assert_eq!(
            WaitOutcome::from_wait_result(Ok(())),
            Ok(WaitOutcome::Signaled)
        );
    }

    #[test]
    fn test_wait_timeout_is_recoverable() {
        assert_eq!(
            WaitOutcome::from_wait_result(Err(vk::Result::TIMEOUT)),
            Ok(WaitOutcome::TimedOut)
        );
    }

    #[test]
    fn test_wait_device_lost_is_error() {
        assert_eq!(
            WaitOutcome::from_wait_result(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn test_semaphore_is_send_sync() {
        // Compile-time check that Semaphore is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        // Compile-time check that Fence is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }
}
