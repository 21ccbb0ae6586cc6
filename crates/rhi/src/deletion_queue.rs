//! Deferred destruction of GPU objects.
//!
//! A [`DeletionQueue`] is an ordered list of tagged `{kind, handle}` entries.
//! Nothing is released when an entry is pushed; [`DeletionQueue::flush`] hands
//! every entry to a [`ResourceReleaser`] in exactly reverse insertion order and
//! leaves the queue empty. Objects created later usually depend on objects
//! created earlier (a pipeline on its layout, a view on its image), so reverse
//! order tears them down safely.
//!
//! The renderer keeps one queue per frame slot, flushed once that slot's fence
//! has signaled, and one process-wide queue flushed at shutdown.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::deletion_queue::{DeletionEntry, DeletionQueue};
//! use renderer_rhi::device::Device;
//! use renderer_rhi::sync::Fence;
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let mut queue = DeletionQueue::new();
//! let fence = Fence::new(device.clone(), true)?;
//! queue.push(fence.into_deletion());
//!
//! // ... later, once the GPU no longer references the fence ...
//! queue.flush(device.as_ref());
//! # Ok(())
//! # }
//! ```

use std::fmt;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::Allocation;
use tracing::{debug, error, trace};

use crate::device::Device;

/// Kind tag of a queued handle, used for dispatch and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pipeline,
    PipelineLayout,
    DescriptorPool,
    DescriptorSetLayout,
    ShaderModule,
    ImageView,
    Image,
    Fence,
    Semaphore,
    CommandPool,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pipeline => "pipeline",
            Self::PipelineLayout => "pipeline layout",
            Self::DescriptorPool => "descriptor pool",
            Self::DescriptorSetLayout => "descriptor set layout",
            Self::ShaderModule => "shader module",
            Self::ImageView => "image view",
            Self::Image => "image",
            Self::Fence => "fence",
            Self::Semaphore => "semaphore",
            Self::CommandPool => "command pool",
        };
        f.write_str(name)
    }
}

/// One deferred release.
///
/// An image entry carries its memory allocation so the image and its memory
/// go away together.
#[derive(Debug)]
pub enum DeletionEntry {
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorPool(vk::DescriptorPool),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    ShaderModule(vk::ShaderModule),
    ImageView(vk::ImageView),
    Image {
        image: vk::Image,
        allocation: Allocation,
    },
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    CommandPool(vk::CommandPool),
}

impl DeletionEntry {
    /// Returns the kind tag of this entry.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Pipeline(_) => ResourceKind::Pipeline,
            Self::PipelineLayout(_) => ResourceKind::PipelineLayout,
            Self::DescriptorPool(_) => ResourceKind::DescriptorPool,
            Self::DescriptorSetLayout(_) => ResourceKind::DescriptorSetLayout,
            Self::ShaderModule(_) => ResourceKind::ShaderModule,
            Self::ImageView(_) => ResourceKind::ImageView,
            Self::Image { .. } => ResourceKind::Image,
            Self::Fence(_) => ResourceKind::Fence,
            Self::Semaphore(_) => ResourceKind::Semaphore,
            Self::CommandPool(_) => ResourceKind::CommandPool,
        }
    }

    /// Returns the raw 64-bit Vulkan handle of this entry.
    pub fn raw_handle(&self) -> u64 {
        match self {
            Self::Pipeline(h) => h.as_raw(),
            Self::PipelineLayout(h) => h.as_raw(),
            Self::DescriptorPool(h) => h.as_raw(),
            Self::DescriptorSetLayout(h) => h.as_raw(),
            Self::ShaderModule(h) => h.as_raw(),
            Self::ImageView(h) => h.as_raw(),
            Self::Image { image, .. } => image.as_raw(),
            Self::Fence(h) => h.as_raw(),
            Self::Semaphore(h) => h.as_raw(),
            Self::CommandPool(h) => h.as_raw(),
        }
    }
}

/// Something that knows how to release every [`ResourceKind`].
///
/// [`Device`] is the production implementation. Tests substitute a recorder.
pub trait ResourceReleaser {
    /// Releases the handle carried by `entry`.
    fn release(&self, entry: DeletionEntry);
}

/// Ordered registry of deferred releases.
///
/// The queue is single-threaded: it is `Send` so it can move with its owner,
/// but pushes and flushes must come from one thread at a time (`&mut self`).
#[derive(Debug, Default)]
pub struct DeletionQueue {
    entries: Vec<DeletionEntry>,
}

impl DeletionQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a release to the queue.
    ///
    /// Registering the same handle twice is a bug (it would be destroyed
    /// twice) and trips a debug assertion.
    pub fn push(&mut self, entry: DeletionEntry) {
        debug_assert!(
            !self.contains(entry.kind(), entry.raw_handle()),
            "{} {:#x} queued for deletion twice",
            entry.kind(),
            entry.raw_handle()
        );
        trace!("Queued {} {:#x} for deletion", entry.kind(), entry.raw_handle());
        self.entries.push(entry);
    }

    /// Releases every queued entry, newest first, and empties the queue.
    ///
    /// Flushing an empty queue does nothing.
    pub fn flush<R>(&mut self, releaser: &R)
    where
        R: ResourceReleaser + ?Sized,
    {
        if self.entries.is_empty() {
            return;
        }

        let count = self.entries.len();
        while let Some(entry) = self.entries.pop() {
            releaser.release(entry);
        }
        debug!("Flushed {} deferred release(s)", count);
    }

    /// Returns `true` if a handle of `kind` with this raw value is queued.
    pub fn contains(&self, kind: ResourceKind, raw_handle: u64) -> bool {
        self.entries
            .iter()
            .any(|e| e.kind() == kind && e.raw_handle() == raw_handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            error!(
                "Deletion queue dropped with {} unreleased entr(ies); handles leaked",
                self.entries.len()
            );
        }
    }
}

impl ResourceReleaser for Device {
    fn release(&self, entry: DeletionEntry) {
        let kind = entry.kind();
        let raw = entry.raw_handle();
        let device = self.handle();

        unsafe {
            match entry {
                DeletionEntry::Pipeline(h) => device.destroy_pipeline(h, None),
                DeletionEntry::PipelineLayout(h) => device.destroy_pipeline_layout(h, None),
                DeletionEntry::DescriptorPool(h) => device.destroy_descriptor_pool(h, None),
                DeletionEntry::DescriptorSetLayout(h) => {
                    device.destroy_descriptor_set_layout(h, None)
                }
                DeletionEntry::ShaderModule(h) => device.destroy_shader_module(h, None),
                DeletionEntry::ImageView(h) => device.destroy_image_view(h, None),
                DeletionEntry::Image { image, allocation } => {
                    device.destroy_image(image, None);
                    if let Err(e) = self.lock_allocator().free(allocation) {
                        error!("Failed to free image memory: {}", e);
                    }
                }
                DeletionEntry::Fence(h) => device.destroy_fence(h, None),
                DeletionEntry::Semaphore(h) => device.destroy_semaphore(h, None),
                DeletionEntry::CommandPool(h) => device.destroy_command_pool(h, None),
            }
        }

        debug!("Destroyed {} {:#x}", kind, raw);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Releaser that records what it was asked to release.
    #[derive(Default)]
    pub(crate) struct RecordingReleaser {
        pub(crate) released: RefCell<Vec<(ResourceKind, u64)>>,
    }

    impl ResourceReleaser for RecordingReleaser {
        fn release(&self, entry: DeletionEntry) {
            self.released
                .borrow_mut()
                .push((entry.kind(), entry.raw_handle()));
        }
    }

    #[test]
    fn test_flush_releases_in_reverse_order() {
        let mut queue = DeletionQueue::new();
        queue.push(DeletionEntry::DescriptorSetLayout(
            vk::DescriptorSetLayout::from_raw(1),
        ));
        queue.push(DeletionEntry::PipelineLayout(vk::PipelineLayout::from_raw(2)));
        queue.push(DeletionEntry::Pipeline(vk::Pipeline::from_raw(3)));
        queue.push(DeletionEntry::Fence(vk::Fence::from_raw(4)));

        let releaser = RecordingReleaser::default();
        queue.flush(&releaser);

        assert_eq!(
            *releaser.released.borrow(),
            vec![
                (ResourceKind::Fence, 4),
                (ResourceKind::Pipeline, 3),
                (ResourceKind::PipelineLayout, 2),
                (ResourceKind::DescriptorSetLayout, 1),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_second_flush_is_noop() {
        let mut queue = DeletionQueue::new();
        queue.push(DeletionEntry::Semaphore(vk::Semaphore::from_raw(7)));

        let releaser = RecordingReleaser::default();
        queue.flush(&releaser);
        queue.flush(&releaser);

        assert_eq!(releaser.released.borrow().len(), 1);
    }

    #[test]
    fn test_flush_empty_queue_releases_nothing() {
        let mut queue = DeletionQueue::new();
        let releaser = RecordingReleaser::default();
        queue.flush(&releaser);
        assert!(releaser.released.borrow().is_empty());
    }

    #[test]
    fn test_queue_reusable_after_flush() {
        let mut queue = DeletionQueue::new();
        let releaser = RecordingReleaser::default();

        queue.push(DeletionEntry::ImageView(vk::ImageView::from_raw(10)));
        queue.flush(&releaser);
        queue.push(DeletionEntry::ImageView(vk::ImageView::from_raw(11)));
        queue.push(DeletionEntry::ShaderModule(vk::ShaderModule::from_raw(12)));
        queue.flush(&releaser);

        assert_eq!(
            *releaser.released.borrow(),
            vec![
                (ResourceKind::ImageView, 10),
                (ResourceKind::ShaderModule, 12),
                (ResourceKind::ImageView, 11),
            ]
        );
    }

    #[test]
    fn test_many_entries_each_released_once() {
        let mut queue = DeletionQueue::new();
        for raw in 1..=64u64 {
            queue.push(DeletionEntry::CommandPool(vk::CommandPool::from_raw(raw)));
        }
        assert_eq!(queue.len(), 64);

        let releaser = RecordingReleaser::default();
        queue.flush(&releaser);

        let released: Vec<u64> = releaser.released.borrow().iter().map(|r| r.1).collect();
        let expected: Vec<u64> = (1..=64u64).rev().collect();
        assert_eq!(released, expected);
    }

    #[test]
    fn test_same_raw_value_different_kind_is_distinct() {
        let mut queue = DeletionQueue::new();
        queue.push(DeletionEntry::Fence(vk::Fence::from_raw(5)));
        queue.push(DeletionEntry::Semaphore(vk::Semaphore::from_raw(5)));

        assert!(queue.contains(ResourceKind::Fence, 5));
        assert!(queue.contains(ResourceKind::Semaphore, 5));
        assert!(!queue.contains(ResourceKind::Pipeline, 5));

        queue.flush(&RecordingReleaser::default());
    }

    #[test]
    #[should_panic(expected = "queued for deletion twice")]
    #[cfg(debug_assertions)]
    fn test_duplicate_push_is_rejected() {
        let mut queue = DeletionQueue::new();
        queue.push(DeletionEntry::Pipeline(vk::Pipeline::from_raw(9)));
        queue.push(DeletionEntry::Pipeline(vk::Pipeline::from_raw(9)));
    }

    #[test]
    fn test_deletion_queue_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DeletionQueue>();
    }
}
