//! Physical device (GPU) selection.
//!
//! A GPU qualifies when it:
//! 1. reports Vulkan 1.3 or newer
//! 2. supports the 1.3 `dynamicRendering` and `synchronization2` features
//!    and the 1.2 `bufferDeviceAddress` and `descriptorIndexing` features
//! 3. has a queue family with graphics that can present to the surface
//!    (the renderer submits and presents on one queue)
//!
//! Qualifying GPUs are ranked, discrete first.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Queue family selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// `true` if one family does both graphics and present.
    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(
            (self.graphics_family, self.present_family),
            (Some(g), Some(p)) if g == p
        )
    }

    /// Picks a family for graphics and present.
    ///
    /// A family that does both wins; otherwise the first graphics family and
    /// the first presenting family are reported (and the result is not
    /// complete).
    pub fn pick(
        families: &[vk::QueueFamilyProperties],
        supports_present: impl Fn(u32) -> bool,
    ) -> Self {
        let mut indices = Self::default();

        for (i, family) in (0u32..).zip(families) {
            if family.queue_count == 0 {
                continue;
            }
            let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = supports_present(i);

            if graphics && present {
                return Self {
                    graphics_family: Some(i),
                    present_family: Some(i),
                };
            }
            if graphics && indices.graphics_family.is_none() {
                indices.graphics_family = Some(i);
            }
            if present && indices.present_family.is_none() {
                indices.present_family = Some(i);
            }
        }

        indices
    }
}

/// Features the renderer relies on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequiredFeatures {
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
    pub buffer_device_address: bool,
    pub descriptor_indexing: bool,
}

impl RequiredFeatures {
    pub fn from_vk(
        features_12: &vk::PhysicalDeviceVulkan12Features<'_>,
        features_13: &vk::PhysicalDeviceVulkan13Features<'_>,
    ) -> Self {
        Self {
            dynamic_rendering: features_13.dynamic_rendering == vk::TRUE,
            synchronization2: features_13.synchronization2 == vk::TRUE,
            buffer_device_address: features_12.buffer_device_address == vk::TRUE,
            descriptor_indexing: features_12.descriptor_indexing == vk::TRUE,
        }
    }

    /// Names of the features that are not supported.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (self.dynamic_rendering, "dynamicRendering"),
            (self.synchronization2, "synchronization2"),
            (self.buffer_device_address, "bufferDeviceAddress"),
            (self.descriptor_indexing, "descriptorIndexing"),
        ]
        .into_iter()
        .filter(|(supported, _)| !supported)
        .map(|(_, name)| name)
        .collect()
    }
}

/// `true` for Vulkan 1.3 and newer.
pub fn supports_vulkan_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// Ranking score; higher is better.
pub fn rate_device_type(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Information about the chosen GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// The family used for both graphics and present.
    pub fn graphics_family(&self) -> RhiResult<u32> {
        self.queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = self.properties.api_version;
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.properties.device_type)
            .field(
                "api_version",
                &format!(
                    "{}.{}.{}",
                    vk::api_version_major(version),
                    vk::api_version_minor(version),
                    vk::api_version_patch(version)
                ),
            )
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Picks the best qualifying GPU for `surface`.
///
/// # Errors
///
/// [`RhiError::NoSuitableGpu`] if nothing qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| check_device(instance, device, surface, surface_loader))
        .max_by_key(|info| rate_device_type(info.properties.device_type));

    match best {
        Some(info) => {
            info!("Selected GPU: {:?}", info);
            Ok(info)
        }
        None => {
            warn!("No suitable GPU found with required capabilities");
            Err(RhiError::NoSuitableGpu)
        }
    }
}

fn check_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name: &CStr = properties.device_name_as_c_str().unwrap_or(c"Unknown");

    if !supports_vulkan_1_3(properties.api_version) {
        debug!("GPU {:?} skipped: Vulkan 1.3 not supported", name);
        return None;
    }

    let mut features_12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features_13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut features_12)
        .push_next(&mut features_13);
    unsafe { instance.get_physical_device_features2(device, &mut features2) };

    let missing = RequiredFeatures::from_vk(&features_12, &features_13).missing();
    if !missing.is_empty() {
        debug!("GPU {:?} skipped: missing features {:?}", name, missing);
        return None;
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = QueueFamilyIndices::pick(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });

    if !queue_families.is_complete() {
        debug!(
            "GPU {:?} skipped: no queue family does both graphics and present",
            name
        );
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        queue_families,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_pick_prefers_family_doing_both() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
        ];
        // Only family 2 can present
        let indices = QueueFamilyIndices::pick(&families, |i| i == 2);

        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(2));
        assert!(indices.is_complete());
    }

    #[test]
    fn test_pick_split_families_is_incomplete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = QueueFamilyIndices::pick(&families, |i| i == 1);

        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_pick_skips_empty_families() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::pick(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
    }

    #[test]
    fn test_vulkan_version_gate() {
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 3, 0)));
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!supports_vulkan_1_3(vk::make_api_version(0, 1, 2, 198)));
    }

    #[test]
    fn test_missing_features_are_named() {
        let features = RequiredFeatures {
            dynamic_rendering: true,
            synchronization2: false,
            buffer_device_address: true,
            descriptor_indexing: false,
        };
        assert_eq!(
            features.missing(),
            vec!["synchronization2", "descriptorIndexing"]
        );
    }

    #[test]
    fn test_features_from_vk() {
        let features_12 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .descriptor_indexing(true);
        let features_13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let features = RequiredFeatures::from_vk(&features_12, &features_13);
        assert!(features.missing().is_empty());
    }

    #[test]
    fn test_discrete_ranks_first() {
        assert!(
            rate_device_type(vk::PhysicalDeviceType::DISCRETE_GPU)
                > rate_device_type(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            rate_device_type(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > rate_device_type(vk::PhysicalDeviceType::CPU)
        );
    }
}
