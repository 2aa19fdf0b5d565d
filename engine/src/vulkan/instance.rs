use std::collections::HashSet;

use anyhow::Result;
use log::*;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::KhrSurfaceExtension;
use vulkanalia::window as vk_window;
use winit::window::Window;

use super::constants;
use super::debug::{self, DebugLog};
use crate::error::EngineError;

#[derive(Debug)]
pub struct VulkanInstance {
    pub vk_instance: Instance,
    pub surface: vk::SurfaceKHR,
    debug_log: Box<dyn DebugLog>,
}

/// Instance-level portability opt-in, decided from what the loader lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Portability {
    pub extensions: Vec<vk::ExtensionName>,
    pub flags: vk::InstanceCreateFlags,
}

impl Portability {
    pub fn detect(available: &HashSet<vk::ExtensionName>) -> Self {
        if available.contains(&vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name) {
            let mut extensions = vec![vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name];
            if available.contains(&vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION.name) {
                extensions.push(vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION.name);
            }
            Self {
                extensions,
                flags: vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR,
            }
        } else {
            Self {
                extensions: Vec::new(),
                flags: vk::InstanceCreateFlags::empty(),
            }
        }
    }
}

impl VulkanInstance {
    pub unsafe fn new(window: &Window, entry: &Entry) -> Result<VulkanInstance> {
        // Application Info
        let application_info = vk::ApplicationInfo::builder()
            .application_name(constants::APPLICATION_NAME)
            .application_version(vk::make_version(1, 0, 0))
            .engine_name(constants::ENGINE_NAME)
            .engine_version(vk::make_version(1, 0, 0))
            .api_version(vk::make_version(1, 0, 0));

        let mut debug_log = debug::debug_log();

        // Layers
        let available_layers = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|l| l.layer_name)
            .collect::<HashSet<_>>();

        if constants::VALIDATION_ENABLED && !available_layers.contains(&constants::VALIDATION_LAYER)
        {
            return Err(EngineError::MissingValidationLayer.into());
        }

        let layers = debug_log.layers();

        // Extensions
        let available_extensions = entry
            .enumerate_instance_extension_properties(None)?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>();

        let portability = Portability::detect(&available_extensions);
        if !portability.extensions.is_empty() {
            info!("Enabling extensions for portability enumeration.");
        }

        let mut extension_names = vk_window::get_required_instance_extensions(window)
            .iter()
            .map(|e| **e)
            .collect::<Vec<_>>();
        extension_names.extend(portability.extensions.iter().copied());
        extension_names.extend(debug_log.instance_extensions());

        let extensions = extension_names
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        // Create
        let mut info = vk::InstanceCreateInfo::builder()
            .application_info(&application_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .flags(portability.flags);

        let mut debug_info = debug_log.create_info();
        if let Some(debug_info) = debug_info.as_mut() {
            info = info.push_next(debug_info);
        }

        let instance = entry.create_instance(&info, None)?;

        // Messenger
        debug_log.attach(&instance)?;

        // Surface
        let surface = vk_window::create_surface(&instance, window, window)?;

        Ok(VulkanInstance {
            vk_instance: instance,
            surface,
            debug_log,
        })
    }

    pub unsafe fn destroy(&mut self) {
        self.vk_instance.destroy_surface_khr(self.surface, None);
        self.debug_log.detach(&self.vk_instance);
        self.vk_instance.destroy_instance(None);
    }
}
