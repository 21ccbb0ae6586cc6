//! Engine lifecycle: init, draw, cleanup.
//!
//! # Teardown order
//!
//! 1. Wait for the device to go idle
//! 2. Per slot: destroy the frame context, then flush the slot's deletion queue
//! 3. Flush the global deletion queue (pipelines, layouts, pool, draw image)
//! 4. Destroy the swapchain
//! 5. Destroy the surface
//! 6. Destroy the device
//! 7. Destroy the instance
//!
//! Only one engine may be live per process at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use renderer_core::EngineConfig;
use renderer_platform::{Surface, Window};
use renderer_rhi::deletion_queue::DeletionQueue;
use renderer_rhi::descriptor::{
    DescriptorAllocator, DescriptorLayoutBuilder, DescriptorSetLayout, PoolSizeRatio, image_info,
    write_images,
};
use renderer_rhi::device::Device;
use renderer_rhi::image::{GpuImage, GpuImageDesc};
use renderer_rhi::instance::{Instance, InstanceDesc};
use renderer_rhi::physical_device::select_physical_device;
use renderer_rhi::pipeline::{ComputePipelineConfig, Pipeline, PipelineLayout};
use renderer_rhi::shader::{ShaderStage, load_shader_module};
use renderer_rhi::swapchain::{Swapchain, SwapchainDesc};
use renderer_rhi::{RhiError, RhiResult};

use crate::FRAME_OVERLAP;
use crate::backend::{BackgroundPass, DrawTarget, FramePacing, VulkanFrameGpu};
use crate::draw_loop::{DrawLoop, FrameReport};
use crate::frame::{FrameCommands, FrameContext, FrameRing, FrameSlot};

/// Format of the draw image the compute pass writes into.
pub const DRAW_IMAGE_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

const DRAW_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::TRANSFER_SRC.as_raw()
        | vk::ImageUsageFlags::TRANSFER_DST.as_raw()
        | vk::ImageUsageFlags::STORAGE.as_raw()
        | vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw(),
);

const BACKGROUND_POOL_RATIOS: [PoolSizeRatio; 1] =
    [PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0)];

static ENGINE_LIVE: AtomicBool = AtomicBool::new(false);

/// Errors surfaced by the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Core(#[from] renderer_core::Error),

    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    /// Another engine is live in this process.
    #[error("An engine is already initialized")]
    AlreadyInitialized,

    /// `draw` after `cleanup`.
    #[error("The engine has been cleaned up")]
    NotInitialized,
}

/// Holds the process-wide "engine live" flag until dropped.
#[derive(Debug)]
struct EngineGuard(());

impl EngineGuard {
    fn acquire() -> Result<Self, EngineError> {
        ENGINE_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(()))
            .map_err(|_| EngineError::AlreadyInitialized)
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        ENGINE_LIVE.store(false, Ordering::Release);
    }
}

// Fields are torn down explicitly in `Live::teardown`.
struct Live {
    draw_loop: DrawLoop<VulkanFrameGpu>,
    global_deletions: DeletionQueue,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
    guard: EngineGuard,
}

/// The renderer: owns every Vulkan object from instance to pipelines.
pub struct Engine {
    live: Option<Live>,
}

impl Engine {
    /// Brings up Vulkan for `window`.
    ///
    /// Any failing step is fatal; everything created up to that point is
    /// released before the error is returned.
    pub fn init(config: &EngineConfig, window: &Window) -> Result<Self, EngineError> {
        let guard = EngineGuard::acquire()?;

        let surface_extensions = window.required_extensions()?;
        let instance = Instance::new(&InstanceDesc {
            app_name: &config.window.title,
            enable_validation: config.vulkan.enable_validation,
            surface_extensions: &surface_extensions,
        })?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!("Using GPU: {}", physical.device_name());

        let device = Device::new(&instance, &physical)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            &SwapchainDesc {
                surface: surface.handle(),
                surface_loader: surface.loader(),
                width: window.width(),
                height: window.height(),
                prefer_mailbox: config.vulkan.prefer_mailbox,
            },
        )?;

        let ring = FrameRing::<FrameCommands, FRAME_OVERLAP>::try_new(|_| {
            FrameCommands::new(device.clone())
        })?
        .try_map(|_, commands| FrameContext::new(device.clone(), commands).map(FrameSlot::new))?;
        debug!("Created {} frame slots", ring.len());

        let mut global_deletions = DeletionQueue::new();
        let resources = create_draw_resources(config, window, &device, &mut global_deletions);
        let (draw_target, background) = match resources {
            Ok(resources) => resources,
            Err(e) => {
                error!("Engine initialization failed: {}", e);
                if let Err(idle) = device.wait_idle() {
                    warn!("Device wait idle failed: {}", idle);
                }
                global_deletions.flush(&*device);
                return Err(e.into());
            }
        };

        let gpu = VulkanFrameGpu::new(
            device.clone(),
            swapchain,
            draw_target,
            background,
            FramePacing {
                fence_timeout_ns: config.frame.fence_timeout_ns,
                acquire_timeout_ns: config.frame.acquire_timeout_ns,
                wait_for_present_idle: config.frame.wait_for_present_idle,
            },
        );

        info!("Engine initialized");

        Ok(Self {
            live: Some(Live {
                draw_loop: DrawLoop::new(gpu, ring),
                global_deletions,
                device,
                surface,
                instance,
                guard,
            }),
        })
    }

    /// `false` once [`cleanup`](Self::cleanup) has run.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.live.is_some()
    }

    /// Runs one pass of the frame state machine.
    ///
    /// # Errors
    ///
    /// Any GPU error is fatal; the caller is expected to clean up.
    pub fn draw(&mut self) -> Result<FrameReport, EngineError> {
        let live = self.live.as_mut().ok_or(EngineError::NotInitialized)?;
        Ok(live.draw_loop.draw()?)
    }

    /// The slot for `frame_number mod FRAME_OVERLAP`.
    pub fn current_frame(&self) -> Option<&FrameSlot<FrameContext>> {
        self.live.as_ref().map(|live| live.draw_loop.current_frame())
    }

    /// Mutable access to the current slot, e.g. to defer a release.
    pub fn current_frame_mut(&mut self) -> Option<&mut FrameSlot<FrameContext>> {
        self.live
            .as_mut()
            .map(|live| live.draw_loop.current_frame_mut())
    }

    /// Frames completed so far.
    pub fn frame_number(&self) -> u64 {
        self.live
            .as_ref()
            .map_or(0, |live| live.draw_loop.frame_number())
    }

    /// Extent of the draw image.
    pub fn draw_extent(&self) -> Option<vk::Extent2D> {
        self.live
            .as_ref()
            .map(|live| live.draw_loop.gpu().draw_extent())
    }

    /// Releases everything in reverse creation order. Safe to call twice.
    pub fn cleanup(&mut self) {
        if let Some(live) = self.live.take() {
            live.teardown();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl Live {
    fn teardown(self) {
        let Self {
            draw_loop,
            mut global_deletions,
            device,
            surface,
            instance,
            guard,
        } = self;

        info!(
            "Cleaning up engine after {} frame(s)",
            draw_loop.frame_number()
        );

        if let Err(e) = device.wait_idle() {
            error!("Device wait idle failed during cleanup: {}", e);
        }

        let (gpu, ring) = draw_loop.into_parts();
        for (index, slot) in ring.into_iter().enumerate() {
            let FrameSlot {
                context,
                mut deletions,
            } = slot;
            drop(context);
            deletions.flush(&*device);
            debug!("Frame slot {} released", index);
        }

        global_deletions.flush(&*device);

        // Swapchain.
        drop(gpu);
        drop(surface);

        match Arc::try_unwrap(device) {
            Ok(device) => drop(device),
            Err(device) => warn!(
                "Device still has {} other reference(s) at cleanup",
                Arc::strong_count(&device) - 1
            ),
        }

        drop(instance);
        drop(guard);

        info!("Engine cleaned up");
    }
}

/// Creates the draw image, its descriptor set and the background pipeline.
///
/// Everything that outlives this call is pushed onto `global`; on error the
/// caller flushes it.
fn create_draw_resources(
    config: &EngineConfig,
    window: &Window,
    device: &Arc<Device>,
    global: &mut DeletionQueue,
) -> RhiResult<(DrawTarget, BackgroundPass)> {
    let extent = window.extent();
    let draw_image = GpuImage::new(
        device.clone(),
        &GpuImageDesc {
            name: "draw image",
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            format: DRAW_IMAGE_FORMAT,
            usage: DRAW_IMAGE_USAGE,
            aspect: vk::ImageAspectFlags::COLOR,
        },
    )?;
    let draw_target = DrawTarget {
        image: draw_image.image(),
        extent: draw_image.extent_2d(),
    };
    let draw_view = draw_image.view();
    for entry in draw_image.into_deletion() {
        global.push(entry);
    }

    let mut descriptors = DescriptorAllocator::init(
        device.clone(),
        config.descriptors.max_sets,
        &BACKGROUND_POOL_RATIOS,
    )?;

    let mut builder = DescriptorLayoutBuilder::new();
    builder.add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
    let set_layout =
        DescriptorSetLayout::new(device.clone(), builder.build(vk::ShaderStageFlags::COMPUTE))?;

    let descriptor_set = descriptors.allocate(&set_layout)?;
    write_images(
        device,
        descriptor_set,
        0,
        vk::DescriptorType::STORAGE_IMAGE,
        &[image_info(
            vk::Sampler::null(),
            draw_view,
            vk::ImageLayout::GENERAL,
        )],
    );

    let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()])?;

    let shader = load_shader_module(
        device.clone(),
        &config.shaders.background_compute,
        ShaderStage::Compute,
    )?;
    let pipeline = Pipeline::compute(
        device.clone(),
        &ComputePipelineConfig {
            layout: pipeline_layout.handle(),
            stage: shader.stage_desc(),
        },
    )?;
    drop(shader);

    let background = BackgroundPass {
        pipeline: pipeline.handle(),
        layout: pipeline_layout.handle(),
        descriptor_set,
    };

    descriptors.defer_destroy(global)?;
    global.push(set_layout.into_deletion());
    global.push(pipeline_layout.into_deletion());
    global.push(pipeline.into_deletion());

    Ok((draw_target, background))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_allows_one_engine() {
        let first = EngineGuard::acquire().unwrap();
        assert!(matches!(
            EngineGuard::acquire(),
            Err(EngineError::AlreadyInitialized)
        ));

        drop(first);
        let again = EngineGuard::acquire();
        assert!(again.is_ok());
    }

    #[test]
    fn test_draw_image_usage() {
        assert!(DRAW_IMAGE_USAGE.contains(vk::ImageUsageFlags::STORAGE));
        assert!(DRAW_IMAGE_USAGE.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(DRAW_IMAGE_USAGE.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(DRAW_IMAGE_USAGE.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn test_engine_error_wraps_rhi() {
        let err: EngineError = RhiError::NoSuitableGpu.into();
        assert_eq!(err.to_string(), "No suitable GPU found");
    }
}
