//! Validation layer output routed into `log`.

use std::ffi::CStr;

use ash::vk;

use crate::config::ValidationLevel;
use crate::error::{RendererError, RendererResult};

/// A `VK_EXT_debug_utils` messenger and the loader that destroys it.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        level: ValidationLevel,
    ) -> RendererResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity_mask(level))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(|e| {
                RendererError::InitializationFailed(format!(
                    "Failed to create debug messenger: {:?}",
                    e
                ))
            })?;

        Ok(Self { loader, messenger })
    }

    /// Must run before the instance is destroyed.
    pub unsafe fn destroy(&mut self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
        self.messenger = vk::DebugUtilsMessengerEXT::null();
    }
}

/// Severities at or above `level`.
pub fn severity_mask(level: ValidationLevel) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    type Severity = vk::DebugUtilsMessageSeverityFlagsEXT;
    match level {
        ValidationLevel::Verbose => {
            Severity::VERBOSE | Severity::INFO | Severity::WARNING | Severity::ERROR
        }
        ValidationLevel::Info => Severity::INFO | Severity::WARNING | Severity::ERROR,
        ValidationLevel::Warning => Severity::WARNING | Severity::ERROR,
        ValidationLevel::Error => Severity::ERROR,
    }
}

fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    }
}

fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::Level::Debug,
        _ => log::Level::Trace,
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    // SAFETY: the driver passes either null or a valid callback struct
    let message = if callback_data.is_null() {
        String::from("(no message)")
    } else {
        let data = unsafe { *callback_data };
        if data.p_message.is_null() {
            String::from("(null message)")
        } else {
            // SAFETY: p_message is a valid null-terminated string from the driver
            unsafe { CStr::from_ptr(data.p_message) }
                .to_string_lossy()
                .into_owned()
        }
    };

    log::log!(
        severity_level(message_severity),
        "[Vulkan {}] {}",
        message_type_label(message_type),
        message
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    type Severity = vk::DebugUtilsMessageSeverityFlagsEXT;

    #[rstest]
    #[case(ValidationLevel::Error, Severity::ERROR)]
    #[case(ValidationLevel::Warning, Severity::WARNING | Severity::ERROR)]
    #[case(ValidationLevel::Info, Severity::INFO | Severity::WARNING | Severity::ERROR)]
    #[case(
        ValidationLevel::Verbose,
        Severity::VERBOSE | Severity::INFO | Severity::WARNING | Severity::ERROR
    )]
    fn test_severity_mask(#[case] level: ValidationLevel, #[case] expected: Severity) {
        assert_eq!(severity_mask(level), expected);
    }

    #[test]
    fn test_default_level_drops_info() {
        let mask = severity_mask(ValidationLevel::default());
        assert!(!mask.contains(Severity::INFO));
        assert!(!mask.contains(Severity::VERBOSE));
        assert!(mask.contains(Severity::WARNING));
    }

    #[test]
    fn test_severity_maps_to_log_level() {
        assert_eq!(
            severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR),
            log::Level::Error
        );
        assert_eq!(
            severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING),
            log::Level::Warn
        );
        assert_eq!(
            severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            log::Level::Debug
        );
        assert_eq!(
            message_type_label(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            "Validation"
        );
    }
}
