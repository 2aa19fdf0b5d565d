use std::ffi::CStr;
use std::os::raw::{c_char, c_void};

use anyhow::Result;
use log::*;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::ExtDebugUtilsExtension;

use super::constants;

/// Routes driver validation output somewhere, or nowhere.
///
/// The concrete logger is picked once from [`constants::VALIDATION_ENABLED`];
/// callers never branch on the build profile themselves.
pub trait DebugLog: std::fmt::Debug {
    fn layers(&self) -> Vec<*const c_char>;
    fn instance_extensions(&self) -> Vec<vk::ExtensionName>;
    /// Chained into instance creation so create/destroy are covered too.
    fn create_info(&self) -> Option<vk::DebugUtilsMessengerCreateInfoEXT>;
    unsafe fn attach(&mut self, instance: &Instance) -> Result<()>;
    unsafe fn detach(&mut self, instance: &Instance);
}

pub fn debug_log() -> Box<dyn DebugLog> {
    if constants::VALIDATION_ENABLED {
        Box::new(ValidationLog::default())
    } else {
        Box::new(NoDebugLog)
    }
}

#[derive(Debug, Default)]
pub struct ValidationLog {
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugLog for ValidationLog {
    fn layers(&self) -> Vec<*const c_char> {
        vec![constants::VALIDATION_LAYER.as_ptr()]
    }

    fn instance_extensions(&self) -> Vec<vk::ExtensionName> {
        vec![vk::EXT_DEBUG_UTILS_EXTENSION.name]
    }

    fn create_info(&self) -> Option<vk::DebugUtilsMessengerCreateInfoEXT> {
        let info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .user_callback(Some(debug_callback))
            .build();
        Some(info)
    }

    unsafe fn attach(&mut self, instance: &Instance) -> Result<()> {
        if let Some(info) = self.create_info() {
            self.messenger = instance.create_debug_utils_messenger_ext(&info, None)?;
        }
        Ok(())
    }

    unsafe fn detach(&mut self, instance: &Instance) {
        instance.destroy_debug_utils_messenger_ext(self.messenger, None);
        self.messenger = vk::DebugUtilsMessengerEXT::null();
    }
}

#[derive(Debug)]
pub struct NoDebugLog;

impl DebugLog for NoDebugLog {
    fn layers(&self) -> Vec<*const c_char> {
        Vec::new()
    }

    fn instance_extensions(&self) -> Vec<vk::ExtensionName> {
        Vec::new()
    }

    fn create_info(&self) -> Option<vk::DebugUtilsMessengerCreateInfoEXT> {
        None
    }

    unsafe fn attach(&mut self, _: &Instance) -> Result<()> {
        Ok(())
    }

    unsafe fn detach(&mut self, _: &Instance) {}
}

extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    let data = unsafe { *data };
    let message = unsafe { CStr::from_ptr(data.message) }.to_string_lossy();

    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        error!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        warn!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        debug!("({:?}) {}", type_, message);
    } else {
        trace!("({:?}) {}", type_, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logger_requests_nothing() {
        let log = NoDebugLog;

        assert!(log.layers().is_empty());
        assert!(log.instance_extensions().is_empty());
        assert!(log.create_info().is_none());
    }

    #[test]
    fn validation_logger_enables_debug_utils() {
        let log = ValidationLog::default();

        assert_eq!(log.layers().len(), 1);
        assert_eq!(log.instance_extensions(), vec![vk::EXT_DEBUG_UTILS_EXTENSION.name]);

        let info = log.create_info().unwrap();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(info.user_callback.is_some());
    }
}
