//! Vulkan instance management.
//!
//! The [`Instance`] owns the loader entry, the `VkInstance` and, when
//! validation is enabled, a debug messenger that routes layer output into
//! `tracing`. Validation messages are diagnostics only; they never change
//! control flow.
//!
//! # Example
//!
//! ```no_run
//! use deferred_rhi::instance::Instance;
//!
//! // Surface extensions normally come from the windowing layer.
//! let extensions = [ash::khr::surface::NAME];
//! let instance = Instance::new(&extensions, cfg!(debug_assertions))?;
//! let vk_instance = instance.handle();
//! # Ok::<(), deferred_rhi::RhiError>(())
//! ```

use std::ffi::CStr;

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::RhiError;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with optional validation layer support.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    /// Present only when validation is enabled
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `required_extensions` - Instance extensions the caller cannot run
    ///   without, typically the surface extensions of the current platform
    /// * `enable_validation` - Enable the Khronos validation layer and a debug
    ///   messenger when the layer is installed
    ///
    /// # Errors
    ///
    /// - [`RhiError::LoadingError`] if the Vulkan loader is missing
    /// - [`RhiError::MissingFeature`] if a required extension is unsupported
    /// - [`RhiError::VulkanError`] if instance or messenger creation fails
    pub fn new(required_extensions: &[&CStr], enable_validation: bool) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        Self::check_extensions(&entry, required_extensions)?;

        let validation_available =
            enable_validation && Self::is_validation_layer_available(&entry)?;
        if enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"Deferred Renderer")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"deferred")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extensions: Vec<*const std::ffi::c_char> =
            required_extensions.iter().map(|name| name.as_ptr()).collect();
        if validation_available {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers = if validation_available {
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
            "Vulkan instance created ({} extensions, validation: {})",
            extensions.len(),
            validation_available
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => (Some(debug_utils), Some(messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
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

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn check_extensions(entry: &Entry, required: &[&CStr]) -> Result<(), RhiError> {
        let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
        let names: Vec<&CStr> = available
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .collect();

        if let Some(missing) = first_missing(required, &names) {
            return Err(RhiError::MissingFeature(format!(
                "instance extension {}",
                missing.to_string_lossy()
            )));
        }
        debug!("All {} required instance extensions available", required.len());
        Ok(())
    }

    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers
            .iter()
            .filter_map(|layer| layer.layer_name_as_c_str().ok())
            .any(|name| name == VALIDATION_LAYER_NAME))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
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
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Returns the first name in `required` that is not in `available`.
fn first_missing<'a>(required: &[&'a CStr], available: &[&CStr]) -> Option<&'a CStr> {
    required
        .iter()
        .copied()
        .find(|name| !available.contains(name))
}

/// Routes validation layer messages into `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid callback data pointer or null.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan {}] {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message)
        }
        _ => debug!("[Vulkan {}] {}", type_str, message),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_missing_finds_absent_extension() {
        let available = [ash::khr::surface::NAME];
        let required = [ash::khr::surface::NAME, ash::khr::xlib_surface::NAME];
        assert_eq!(
            first_missing(&required, &available),
            Some(ash::khr::xlib_surface::NAME)
        );
    }

    #[test]
    fn test_first_missing_none_when_all_present() {
        let available = [ash::khr::surface::NAME, ash::ext::debug_utils::NAME];
        let required = [ash::khr::surface::NAME];
        assert!(first_missing(&required, &available).is_none());
    }

    #[test]
    fn test_instance_creation_without_validation() {
        match Instance::new(&[], false) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(e) => eprintln!("Skipping test: Vulkan not available ({e})"),
        }
    }

    #[test]
    fn test_missing_extension_is_reported() {
        let bogus = [c"VK_NOT_A_REAL_extension"];
        match Instance::new(&bogus, false) {
            Err(RhiError::MissingFeature(msg)) => assert!(msg.contains("VK_NOT_A_REAL")),
            Err(RhiError::LoadingError(_)) => eprintln!("Skipping test: Vulkan not available"),
            Err(e) => eprintln!("Skipping test: {e}"),
            Ok(_) => panic!("bogus extension should not be accepted"),
        }
    }
}
