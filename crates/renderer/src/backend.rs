//! The Vulkan implementation of [`FrameGpu`].
//!
//! Each frame runs a compute pass that fills the draw image, then blits the
//! draw image into the acquired swapchain image:
//!
//! ```text
//! draw image       UNDEFINED -> GENERAL            (compute writes)
//! dispatch         ceil(w / 16) x ceil(h / 16) x 1
//! draw image       GENERAL -> TRANSFER_SRC_OPTIMAL
//! swapchain image  UNDEFINED -> TRANSFER_DST_OPTIMAL
//! blit             draw extent -> swapchain extent
//! swapchain image  TRANSFER_DST_OPTIMAL -> PRESENT_SRC_KHR
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::error;

use renderer_rhi::RhiResult;
use renderer_rhi::command::{command_buffer_submit_info, semaphore_submit_info};
use renderer_rhi::deletion_queue::{DeletionEntry, ResourceReleaser};
use renderer_rhi::device::Device;
use renderer_rhi::image::{ImageTransition, blit_image_to_image, transition_image};
use renderer_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use renderer_rhi::sync::WaitOutcome;

use crate::draw_loop::FrameGpu;
use crate::frame::FrameContext;

/// Workgroup edge of the background compute shader.
pub const WORKGROUP_SIZE: u32 = 16;

/// Draw image before the compute pass; its old contents are discarded.
pub const DRAW_IMAGE_TO_GENERAL: ImageTransition = ImageTransition::new(
    vk::ImageLayout::UNDEFINED,
    vk::ImageLayout::GENERAL,
    vk::PipelineStageFlags2::TOP_OF_PIPE,
    vk::AccessFlags2::NONE,
    vk::PipelineStageFlags2::COMPUTE_SHADER,
    vk::AccessFlags2::SHADER_STORAGE_WRITE,
);

pub const DRAW_IMAGE_TO_TRANSFER_SRC: ImageTransition = ImageTransition::new(
    vk::ImageLayout::GENERAL,
    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    vk::PipelineStageFlags2::COMPUTE_SHADER,
    vk::AccessFlags2::SHADER_STORAGE_WRITE,
    vk::PipelineStageFlags2::BLIT,
    vk::AccessFlags2::TRANSFER_READ,
);

pub const SWAPCHAIN_TO_TRANSFER_DST: ImageTransition = ImageTransition::new(
    vk::ImageLayout::UNDEFINED,
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    vk::PipelineStageFlags2::TOP_OF_PIPE,
    vk::AccessFlags2::NONE,
    vk::PipelineStageFlags2::BLIT,
    vk::AccessFlags2::TRANSFER_WRITE,
);

pub const SWAPCHAIN_TO_PRESENT: ImageTransition = ImageTransition::new(
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    vk::ImageLayout::PRESENT_SRC_KHR,
    vk::PipelineStageFlags2::BLIT,
    vk::AccessFlags2::TRANSFER_WRITE,
    vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
    vk::AccessFlags2::NONE,
);

/// Stage at which the submit waits for the acquired image.
pub const ACQUIRE_WAIT_STAGE: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT.as_raw()
        | vk::PipelineStageFlags2::BLIT.as_raw(),
);

/// Stage at which the submit signals "render finished".
pub const RENDER_SIGNAL_STAGE: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::ALL_COMMANDS;

/// Workgroups needed to cover `extent`.
pub fn dispatch_groups(extent: vk::Extent2D) -> (u32, u32, u32) {
    (
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
        1,
    )
}

/// Raw handles of the draw image; ownership sits in the global deletion queue.
#[derive(Debug, Clone, Copy)]
pub struct DrawTarget {
    pub image: vk::Image,
    pub extent: vk::Extent2D,
}

/// Raw handles of the background compute pass.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundPass {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
}

/// Timeouts and pacing for the frame backend.
#[derive(Debug, Clone, Copy)]
pub struct FramePacing {
    pub fence_timeout_ns: u64,
    pub acquire_timeout_ns: u64,
    /// Block on the queue after every present.
    pub wait_for_present_idle: bool,
}

pub struct VulkanFrameGpu {
    device: Arc<Device>,
    swapchain: Swapchain,
    draw_target: DrawTarget,
    background: BackgroundPass,
    pacing: FramePacing,
}

impl VulkanFrameGpu {
    pub fn new(
        device: Arc<Device>,
        swapchain: Swapchain,
        draw_target: DrawTarget,
        background: BackgroundPass,
        pacing: FramePacing,
    ) -> Self {
        Self {
            device,
            swapchain,
            draw_target,
            background,
            pacing,
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn draw_extent(&self) -> vk::Extent2D {
        self.draw_target.extent
    }

    fn submit_with(
        &self,
        frame: &FrameContext,
        command_buffers: &[vk::CommandBufferSubmitInfo<'_>],
        waits: &[vk::SemaphoreSubmitInfo<'_>],
        signals: &[vk::SemaphoreSubmitInfo<'_>],
    ) -> RhiResult<()> {
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(waits)
            .command_buffer_infos(command_buffers)
            .signal_semaphore_infos(signals);

        unsafe { self.device.submit2(&[submit], frame.render_fence.handle()) }
    }
}

impl ResourceReleaser for VulkanFrameGpu {
    fn release(&self, entry: DeletionEntry) {
        self.device.release(entry);
    }
}

impl FrameGpu for VulkanFrameGpu {
    type Frame = FrameContext;

    fn wait_fence(&self, frame: &FrameContext) -> RhiResult<WaitOutcome> {
        frame.render_fence.wait_for(self.pacing.fence_timeout_ns)
    }

    fn reset_fence(&self, frame: &FrameContext) -> RhiResult<()> {
        frame.render_fence.reset()
    }

    fn acquire_image(&self, frame: &FrameContext) -> RhiResult<AcquireOutcome> {
        self.swapchain.acquire_next_image(
            frame.swapchain_semaphore.handle(),
            self.pacing.acquire_timeout_ns,
        )
    }

    fn record(&self, frame: &FrameContext, image_index: u32) -> RhiResult<()> {
        let cmd = &frame.commands.buffer;
        let draw_image = self.draw_target.image;
        let swapchain_image = self.swapchain.image(image_index)?;

        cmd.reset()?;
        cmd.begin()?;

        transition_image(cmd, draw_image, &DRAW_IMAGE_TO_GENERAL);

        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.background.pipeline);
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            self.background.layout,
            0,
            &[self.background.descriptor_set],
        );
        let (x, y, z) = dispatch_groups(self.draw_target.extent);
        cmd.dispatch(x, y, z);

        transition_image(cmd, draw_image, &DRAW_IMAGE_TO_TRANSFER_SRC);
        transition_image(cmd, swapchain_image, &SWAPCHAIN_TO_TRANSFER_DST);

        blit_image_to_image(
            cmd,
            draw_image,
            swapchain_image,
            self.draw_target.extent,
            self.swapchain.extent(),
        );

        transition_image(cmd, swapchain_image, &SWAPCHAIN_TO_PRESENT);

        cmd.end()
    }

    fn submit(&self, frame: &FrameContext) -> RhiResult<()> {
        let command_buffers = [command_buffer_submit_info(frame.commands.buffer.handle())];
        let waits = [semaphore_submit_info(
            ACQUIRE_WAIT_STAGE,
            frame.swapchain_semaphore.handle(),
        )];
        let signals = [semaphore_submit_info(
            RENDER_SIGNAL_STAGE,
            frame.render_semaphore.handle(),
        )];

        self.submit_with(frame, &command_buffers, &waits, &signals)
            .inspect_err(|e| error!("Queue submit failed: {}", e))
    }

    fn present(&self, frame: &FrameContext, image_index: u32) -> RhiResult<PresentOutcome> {
        let outcome = self.swapchain.present(
            self.device.graphics_queue(),
            image_index,
            frame.render_semaphore.handle(),
        )?;

        if self.pacing.wait_for_present_idle {
            self.device.queue_wait_idle()?;
        }

        Ok(outcome)
    }

    fn signal_fence(&self, frame: &FrameContext) -> RhiResult<()> {
        self.submit_with(frame, &[], &[], &[])
    }
}
