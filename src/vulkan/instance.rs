//! Vulkan instance creation and configuration.

use std::ffi::{CStr, CString};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::config::ValidationLevel;
use crate::error::{RendererError, RendererResult};

use super::debug::DebugMessenger;

/// Descriptor indexing is core in 1.2; robustness2 is requested as an extension.
const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 2, 0);

/// Validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Create a Vulkan instance able to present to `display_handle`.
///
/// When `validation_enabled` is set and the Khronos layer is installed, a
/// debug messenger is attached that forwards layer output at or above
/// `validation_level` to `log`.
pub fn create_instance(
    entry: &ash::Entry,
    application_name: &str,
    display_handle: RawDisplayHandle,
    validation_enabled: bool,
    validation_level: ValidationLevel,
) -> RendererResult<(ash::Instance, Option<DebugMessenger>)> {
    let validation_available = validation_enabled && check_validation_layer_support(entry);

    if validation_enabled && !validation_available {
        log::warn!("Validation layers requested but not available");
    }

    let app_name = CString::new(application_name).map_err(|e| {
        RendererError::InitializationFailed(format!("Invalid application name: {}", e))
    })?;
    let engine_name = c"lilium-frame";

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    // Surface extensions for whatever windowing system owns the display
    let mut extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| {
            RendererError::InitializationFailed(format!(
                "Failed to query surface extensions: {:?}",
                e
            ))
        })?
        .to_vec();

    if validation_available {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
    }

    let layer_names: Vec<*const std::ffi::c_char> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    #[allow(unused_mut)]
    let mut create_flags = vk::InstanceCreateFlags::empty();

    #[cfg(target_os = "macos")]
    {
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        RendererError::InitializationFailed(format!("Failed to create Vulkan instance: {:?}", e))
    })?;

    let debug_messenger = if validation_available {
        match DebugMessenger::new(entry, &instance, validation_level) {
            Ok(messenger) => Some(messenger),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        }
    } else {
        None
    };

    Ok((instance, debug_messenger))
}

/// Check if the validation layer is available.
fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let available_layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(_) => return false,
    };

    available_layers.iter().any(|layer| {
        // SAFETY: layer_name is a null-terminated array filled by the loader
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER_NAME
    })
}
