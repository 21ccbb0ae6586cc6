//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and presentation.
//!
//! # Overview
//!
//! The [`Swapchain`] struct provides a safe abstraction over the Vulkan swapchain,
//! including:
//! - Surface capability querying
//! - Format and present mode selection
//! - Image view creation and management
//!
//! Swapchain images are blit targets, so they carry `TRANSFER_DST` usage.
//! The swapchain is never recreated; acquisition and presentation report
//! out-of-date and suboptimal states as values the caller decides on.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::instance::Instance;
//! use renderer_rhi::swapchain::{AcquireOutcome, Swapchain, SwapchainDesc};
//! use ash::vk;
//!
//! # fn example(
//! #     instance: &Instance,
//! #     device: Arc<Device>,
//! #     surface: vk::SurfaceKHR,
//! #     image_available: vk::Semaphore,
//! # ) -> renderer_rhi::RhiResult<()> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let swapchain = Swapchain::new(
//!     instance,
//!     device,
//!     &SwapchainDesc {
//!         surface,
//!         surface_loader: &surface_loader,
//!         width: 720,
//!         height: 405,
//!         prefer_mailbox: true,
//!     },
//! )?;
//!
//! if let AcquireOutcome::Acquired { image_index, .. } =
//!     swapchain.acquire_next_image(image_available, 1_000_000_000)?
//! {
//!     let _target = swapchain.image(image_index)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::subresource_range;
use crate::instance::Instance;

/// Preferred swapchain format.
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Result of asking the presentation engine for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready; `suboptimal` means the surface no longer matches
    /// exactly but the image can still be presented.
    Acquired { image_index: u32, suboptimal: bool },
    /// No image became available within the timeout.
    TimedOut,
    /// A zero timeout was used and no image was ready.
    NotReady,
    /// The surface changed and the swapchain can no longer present.
    OutOfDate,
}

impl AcquireOutcome {
    /// Classifies a raw `vkAcquireNextImageKHR` result.
    ///
    /// Anything other than the recoverable codes stays an error.
    pub fn from_result(result: Result<(u32, bool), vk::Result>) -> Result<Self, vk::Result> {
        match result {
            Ok((image_index, suboptimal)) => Ok(Self::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::TIMEOUT) => Ok(Self::TimedOut),
            Err(vk::Result::NOT_READY) => Ok(Self::NotReady),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(e) => Err(e),
        }
    }

    /// The image index, if one was acquired.
    #[inline]
    pub fn image_index(self) -> Option<u32> {
        match self {
            Self::Acquired { image_index, .. } => Some(image_index),
            _ => None,
        }
    }
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented (or dropped) while the surface was suboptimal or out of date.
    Suboptimal,
}

impl PresentOutcome {
    pub fn from_result(result: Result<bool, vk::Result>) -> Result<Self, vk::Result> {
        match result {
            Ok(false) => Ok(Self::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::Suboptimal),
            Err(e) => Err(e),
        }
    }
}

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, min image count {}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Swapchain creation parameters.
pub struct SwapchainDesc<'a> {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub width: u32,
    pub height: u32,
    /// Use MAILBOX when the surface offers it; FIFO otherwise.
    pub prefer_mailbox: bool,
}

/// Vulkan swapchain wrapper.
///
/// Owns the swapchain and one view per image. The images themselves belong to
/// the swapchain.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for `desc.surface`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Surface queries fail
    /// - No format or present mode is available
    /// - Swapchain or image view creation fails
    pub fn new(instance: &Instance, device: Arc<Device>, desc: &SwapchainDesc<'_>) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let support = SwapchainSupportDetails::query(
            device.physical_device(),
            desc.surface,
            desc.surface_loader,
        )?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| RhiError::SwapchainError("No surface formats".to_string()))?;
        let present_mode = choose_present_mode(&support.present_modes, desc.prefer_mailbox);
        let extent = choose_extent(&support.capabilities, desc.width, desc.height);
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };
        info!("Swapchain created with {} images", images.len());

        let mut this = Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            present_mode,
        };
        // On failure, Drop releases the views created so far and the swapchain.
        this.create_image_views()?;

        Ok(this)
    }

    /// Acquires the next image, signalling `semaphore` when it is ready.
    ///
    /// Timeouts and out-of-date surfaces are outcomes, not errors.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )
        };
        Ok(AcquireOutcome::from_result(result)?)
    }

    /// Queues `image_index` for presentation after `wait_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        Ok(PresentOutcome::from_result(result)?)
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the swapchain image at `index`.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainError`] if `index` is out of range.
    #[inline]
    pub fn image(&self, index: u32) -> RhiResult<vk::Image> {
        image_at(&self.images, index)
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn create_image_views(&mut self) -> RhiResult<()> {
        for (i, &image) in self.images.iter().enumerate() {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR));

            let view = unsafe { self.device.handle().create_image_view(&create_info, None) }
                .map_err(|e| {
                    RhiError::SwapchainError(format!("Failed to create image view {}: {:?}", i, e))
                })?;
            self.image_views.push(view);
        }

        debug!("Created {} swapchain image views", self.image_views.len());
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }

        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Picks B8G8R8A8_UNORM / SRGB_NONLINEAR, falling back to the first format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if formats.contains(&PREFERRED_FORMAT) {
        return Some(PREFERRED_FORMAT);
    }

    let first = formats.first().copied()?;
    warn!("Using first available surface format: {:?}", first.format);
    Some(first)
}

/// MAILBOX when preferred and offered, FIFO otherwise (always supported).
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    prefer_mailbox: bool,
) -> vk::PresentModeKHR {
    if prefer_mailbox && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    vk::PresentModeKHR::FIFO
}

/// Uses the surface's current extent if defined, else clamps the requested size.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Looks up an acquired image index.
fn image_at(images: &[vk::Image], index: u32) -> RhiResult<vk::Image> {
    images.get(index as usize).copied().ok_or_else(|| {
        RhiError::SwapchainError(format!(
            "image index {} out of range for {} swapchain image(s)",
            index,
            images.len()
        ))
    })
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_image_at_rejects_out_of_range_index() {
        use ash::vk::Handle;

        let images = [vk::Image::from_raw(10), vk::Image::from_raw(11)];
        assert_eq!(image_at(&images, 1).unwrap(), vk::Image::from_raw(11));

        let err = image_at(&images, 2).unwrap_err();
        assert!(matches!(err, RhiError::SwapchainError(_)));
        assert!(err.to_string().contains("index 2"));
    }

    #[test]
    fn test_choose_surface_format_prefers_unorm() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
            format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(choose_surface_format(&formats), Some(PREFERRED_FORMAT));
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = [format(vk::Format::R8G8B8A8_UNORM)];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE], true),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 720, 405);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));

        let extent = choose_extent(&capabilities, 720, 405);
        assert_eq!((extent.width, extent.height), (720, 405));
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 3);
    }

    #[test]
    fn test_acquire_outcome_classification() {
        assert_eq!(
            AcquireOutcome::from_result(Ok((2, false))),
            Ok(AcquireOutcome::Acquired {
                image_index: 2,
                suboptimal: false
            })
        );
        assert_eq!(
            AcquireOutcome::from_result(Ok((0, true))).map(AcquireOutcome::image_index),
            Ok(Some(0))
        );
        assert_eq!(
            AcquireOutcome::from_result(Err(vk::Result::TIMEOUT)),
            Ok(AcquireOutcome::TimedOut)
        );
        assert_eq!(
            AcquireOutcome::from_result(Err(vk::Result::NOT_READY)),
            Ok(AcquireOutcome::NotReady)
        );
        assert_eq!(
            AcquireOutcome::from_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(AcquireOutcome::OutOfDate)
        );
        assert_eq!(
            AcquireOutcome::from_result(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn test_present_outcome_classification() {
        assert_eq!(PresentOutcome::from_result(Ok(false)), Ok(PresentOutcome::Presented));
        assert_eq!(PresentOutcome::from_result(Ok(true)), Ok(PresentOutcome::Suboptimal));
        assert_eq!(
            PresentOutcome::from_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(PresentOutcome::Suboptimal)
        );
        assert_eq!(
            PresentOutcome::from_result(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR)
        );
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate
        };
        assert!(!no_modes.is_adequate());
    }
}
