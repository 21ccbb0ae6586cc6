//! GPU images and the layout-transition / blit helpers.
//!
//! [`GpuImage`] owns an image, its view and its memory. Its layout is never
//! stored: callers track it and move it with [`transition_image`] right
//! before each use. Nothing here checks that the `old_layout` of a
//! transition matches the image's real layout.
//!
//! A blit into the swapchain follows a fixed caller discipline:
//!
//! ```text
//! transition(src, * -> TRANSFER_SRC_OPTIMAL)
//! transition(dst, * -> TRANSFER_DST_OPTIMAL)
//! blit_image_to_image(src, dst, ...)
//! transition(dst, TRANSFER_DST_OPTIMAL -> PRESENT_SRC_KHR)
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::CommandBuffer;
use crate::deletion_queue::DeletionEntry;
use crate::device::Device;
use crate::error::RhiResult;

// =============================================================================
// Transitions
// =============================================================================

/// Aspect a barrier must cover for an image entering `new_layout`.
///
/// Depth-only layouts select `DEPTH`, combined depth-stencil layouts select
/// `DEPTH | STENCIL`, everything else is `COLOR`.
pub fn aspect_for_layout(new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    match new_layout {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Mip 0 and array layer 0 of `aspect`.
pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// A layout change plus the execution and memory dependency around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl ImageTransition {
    pub const fn new(
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> Self {
        Self {
            old_layout,
            new_layout,
            src_stage,
            src_access,
            dst_stage,
            dst_access,
        }
    }
}

/// Builds the single full-image barrier for `transition`.
pub fn image_barrier(
    image: vk::Image,
    transition: &ImageTransition,
) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(transition.src_stage)
        .src_access_mask(transition.src_access)
        .dst_stage_mask(transition.dst_stage)
        .dst_access_mask(transition.dst_access)
        .old_layout(transition.old_layout)
        .new_layout(transition.new_layout)
        .image(image)
        .subresource_range(subresource_range(aspect_for_layout(
            transition.new_layout,
        )))
}

/// Records one barrier moving `image` through `transition`.
pub fn transition_image(cmd: &CommandBuffer, image: vk::Image, transition: &ImageTransition) {
    cmd.pipeline_barrier2(&[image_barrier(image, transition)]);
}

// =============================================================================
// Blit
// =============================================================================

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: i32::try_from(extent.width).unwrap_or(i32::MAX),
        y: i32::try_from(extent.height).unwrap_or(i32::MAX),
        z: 1,
    }
}

fn color_layer() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

/// Region copying all of `src_extent` onto all of `dst_extent`.
pub fn blit_region(src_extent: vk::Extent2D, dst_extent: vk::Extent2D) -> vk::ImageBlit2<'static> {
    vk::ImageBlit2::default()
        .src_offsets([vk::Offset3D::default(), far_corner(src_extent)])
        .dst_offsets([vk::Offset3D::default(), far_corner(dst_extent)])
        .src_subresource(color_layer())
        .dst_subresource(color_layer())
}

/// Records a linear-filtered, scaling copy from `src` to `dst`.
///
/// `src` must be in `TRANSFER_SRC_OPTIMAL` and `dst` in
/// `TRANSFER_DST_OPTIMAL`.
pub fn blit_image_to_image(
    cmd: &CommandBuffer,
    src: vk::Image,
    dst: vk::Image,
    src_extent: vk::Extent2D,
    dst_extent: vk::Extent2D,
) {
    let regions = [blit_region(src_extent, dst_extent)];
    let blit_info = vk::BlitImageInfo2::default()
        .src_image(src)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(dst)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .filter(vk::Filter::LINEAR)
        .regions(&regions);

    cmd.blit_image2(&blit_info);
}

// =============================================================================
// GpuImage
// =============================================================================

/// Parameters for [`GpuImage::new`].
#[derive(Debug, Clone, Copy)]
pub struct GpuImageDesc<'a> {
    pub name: &'a str,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// A 2D, single-mip, device-local image with one view.
pub struct GpuImage {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    /// `None` once handed to a deletion queue.
    allocation: Option<Allocation>,
    extent: vk::Extent3D,
    format: vk::Format,
}

impl GpuImage {
    /// Creates the image, binds GPU-only memory to it and creates its view.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; partial work is undone.
    pub fn new(device: Arc<Device>, desc: &GpuImageDesc<'_>) -> RhiResult<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let vk_device = device.handle();
        let image = unsafe { vk_device.create_image(&create_info, None)? };
        let requirements = unsafe { vk_device.get_image_memory_requirements(image) };

        let allocation = device
            .lock_allocator()
            .allocate(&AllocationCreateDesc {
                name: desc.name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .inspect_err(|_| unsafe { vk_device.destroy_image(image, None) })?;

        let bound = unsafe {
            vk_device.bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            Self::discard(&device, image, allocation);
            return Err(e.into());
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .image(image)
            .format(desc.format)
            .subresource_range(subresource_range(desc.aspect));

        let view = match unsafe { vk_device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                Self::discard(&device, image, allocation);
                return Err(e.into());
            }
        };

        debug!(
            "Created image '{}' {}x{} {:?}",
            desc.name, desc.extent.width, desc.extent.height, desc.format
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            extent: desc.extent,
            format: desc.format,
        })
    }

    fn discard(device: &Device, image: vk::Image, allocation: Allocation) {
        unsafe { device.handle().destroy_image(image, None) };
        if let Err(e) = device.lock_allocator().free(allocation) {
            error!("Failed to free image memory: {}", e);
        }
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Gives up ownership. The entries are in push order: the image first,
    /// then its view, so a reverse-order flush destroys the view first.
    pub fn into_deletion(mut self) -> Vec<DeletionEntry> {
        let mut entries = Vec::with_capacity(2);
        if let Some(allocation) = self.allocation.take() {
            entries.push(DeletionEntry::Image {
                image: std::mem::take(&mut self.image),
                allocation,
            });
        }
        entries.push(DeletionEntry::ImageView(std::mem::take(&mut self.view)));
        entries
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        if self.view != vk::ImageView::null() {
            unsafe { self.device.handle().destroy_image_view(self.view, None) };
        }
        if let Some(allocation) = self.allocation.take() {
            Self::discard(&self.device, self.image, allocation);
            debug!("Destroyed image {:?}", self.format);
        }
    }
}
