//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and debug messengers.
//!
//! # Overview
//!
//! The [`Instance`] struct owns the Vulkan loader entry, the instance, and
//! (when validation is on) the debug messenger that routes validation output
//! into `tracing`. Surface extensions come from the windowing layer so this
//! crate stays platform-agnostic.
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::instance::{Instance, InstanceDesc};
//!
//! let instance = Instance::new(&InstanceDesc {
//!     app_name: "Vulkan Engine",
//!     enable_validation: cfg!(debug_assertions),
//!     surface_extensions: &[],
//! })
//! .expect("Failed to create Vulkan instance");
//!
//! let _vk_instance = instance.handle();
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};

use crate::error::{RhiError, RhiResult};

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Engine name reported to the driver.
const ENGINE_NAME: &CStr = c"vk_engine";

/// Instance creation parameters.
#[derive(Clone, Copy, Debug)]
pub struct InstanceDesc<'a> {
    pub app_name: &'a str,
    /// Request the Khronos validation layer and a debug messenger.
    pub enable_validation: bool,
    /// Surface extensions required by the window system.
    pub surface_extensions: &'a [*const c_char],
}

/// Vulkan instance wrapper with optional validation layer support.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    /// Present only when validation is enabled.
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Creates a Vulkan 1.3 instance.
    ///
    /// Validation is silently dropped (with a warning) when the layer is not
    /// installed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Instance creation fails
    /// - Debug messenger setup fails (when validation is enabled)
    pub fn new(desc: &InstanceDesc<'_>) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation = desc.enable_validation && Self::is_validation_layer_available(&entry)?;
        if desc.enable_validation && !validation {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        // Interior NULs are replaced rather than rejected.
        let app_name = CString::new(desc.app_name.replace('\0', " "))
            .unwrap_or_else(|_| c"Vulkan Engine".to_owned());

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let extensions = required_extensions(desc.surface_extensions, validation);
        let layers = if validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created (API version 1.3, {} extension(s))",
            extensions.len()
        );

        let debug_utils = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match Self::setup_debug_messenger(&loader) {
                Ok(messenger) => {
                    info!("Validation layers enabled");
                    Some((loader, messenger))
                }
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_utils.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER_NAME)))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        debug!("Debug messenger created");
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
                debug!("Debug messenger destroyed");
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Window-system extensions plus debug utils when validating.
fn required_extensions(surface_extensions: &[*const c_char], validation: bool) -> Vec<*const c_char> {
    let mut extensions = surface_extensions.to_vec();
    if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    extensions
}

/// Routes validation layer messages into `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid (or null) callback data pointer.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = unsafe { callback_data.message_as_c_str() }
        .map(CStr::to_string_lossy)
        .unwrap_or(std::borrow::Cow::Borrowed("(no message)"));

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan {}] {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[Vulkan {}] {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!("[Vulkan {}] {}", type_str, message),
        _ => trace!("[Vulkan {}] {}", type_str, message),
    }

    vk::FALSE
}
