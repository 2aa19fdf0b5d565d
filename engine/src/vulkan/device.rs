use std::collections::HashSet;

use anyhow::Result;
use log::*;
use thiserror::Error;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::KhrSurfaceExtension;

use super::constants;
use super::instance::VulkanInstance;
use crate::error::EngineError;

/// The logical device, its queues and the physical device facts the
/// allocator and swapchain need later.
#[derive(Debug)]
pub struct VulkanDevice {
    pub physical_device: vk::PhysicalDevice,
    pub vk_device: Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub indices: QueueFamilyIndices,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub limits: vk::PhysicalDeviceLimits,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Missing {0}.")]
pub struct SuitabilityError(pub &'static str);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

/// What device selection needs to know about one physical device.
#[derive(Clone, Debug, Default)]
pub struct DeviceCandidate {
    pub name: String,
    pub queue_families: Vec<QueueFamilySupport>,
    pub sampler_anisotropy: bool,
    pub extensions: HashSet<vk::ExtensionName>,
    pub format_count: usize,
    pub present_mode_count: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Prefers one family that does both; otherwise the first of each.
    pub fn find(families: &[QueueFamilySupport]) -> Option<Self> {
        if let Some(both) = families.iter().position(|f| f.graphics && f.present) {
            return Some(Self {
                graphics: both as u32,
                present: both as u32,
            });
        }

        let graphics = families.iter().position(|f| f.graphics)?;
        let present = families.iter().position(|f| f.present)?;
        Some(Self {
            graphics: graphics as u32,
            present: present as u32,
        })
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

impl DeviceCandidate {
    pub fn check(&self) -> Result<QueueFamilyIndices, SuitabilityError> {
        let indices = QueueFamilyIndices::find(&self.queue_families)
            .ok_or(SuitabilityError("required queue families"))?;

        if !self.sampler_anisotropy {
            return Err(SuitabilityError("sampler anisotropy"));
        }

        if !constants::DEVICE_EXTENSIONS
            .iter()
            .all(|e| self.extensions.contains(e))
        {
            return Err(SuitabilityError("required device extensions"));
        }

        if self.format_count == 0 || self.present_mode_count == 0 {
            return Err(SuitabilityError("sufficient swapchain support"));
        }

        Ok(indices)
    }
}

/// Returns the first candidate in enumeration order that qualifies.
pub fn select_device(candidates: &[DeviceCandidate]) -> Result<(usize, QueueFamilyIndices)> {
    for (index, candidate) in candidates.iter().enumerate() {
        match candidate.check() {
            Ok(indices) => {
                info!("Selected physical device (`{}`).", candidate.name);
                return Ok((index, indices));
            }
            Err(error) => warn!("Skipping physical device (`{}`): {}", candidate.name, error),
        }
    }
    Err(EngineError::NoSuitableDevice.into())
}

impl VulkanDevice {
    unsafe fn describe(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<DeviceCandidate> {
        let vk_instance = &instance.vk_instance;
        let properties = vk_instance.get_physical_device_properties(physical_device);
        let features = vk_instance.get_physical_device_features(physical_device);

        let mut queue_families = Vec::new();
        for (index, family) in vk_instance
            .get_physical_device_queue_family_properties(physical_device)
            .iter()
            .enumerate()
        {
            queue_families.push(QueueFamilySupport {
                graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present: vk_instance.get_physical_device_surface_support_khr(
                    physical_device,
                    index as u32,
                    instance.surface,
                )?,
            });
        }

        let extensions = vk_instance
            .enumerate_device_extension_properties(physical_device, None)?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>();

        // Surface queries are only meaningful once the swapchain extension exists.
        let (format_count, present_mode_count) =
            if extensions.contains(&vk::KHR_SWAPCHAIN_EXTENSION.name) {
                (
                    vk_instance
                        .get_physical_device_surface_formats_khr(physical_device, instance.surface)?
                        .len(),
                    vk_instance
                        .get_physical_device_surface_present_modes_khr(
                            physical_device,
                            instance.surface,
                        )?
                        .len(),
                )
            } else {
                (0, 0)
            };

        Ok(DeviceCandidate {
            name: properties.device_name.to_string(),
            queue_families,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            extensions,
            format_count,
            present_mode_count,
        })
    }

    pub unsafe fn new(instance: &VulkanInstance) -> Result<VulkanDevice> {
        let physical_devices = instance.vk_instance.enumerate_physical_devices()?;
        let candidates = physical_devices
            .iter()
            .map(|d| VulkanDevice::describe(instance, *d))
            .collect::<Result<Vec<_>>>()?;

        let (selected, indices) = select_device(&candidates)?;
        let physical_device = physical_devices[selected];

        let queue_priorities = &[1.0];
        let queue_infos = indices
            .unique()
            .iter()
            .map(|i| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(*i)
                    .queue_priorities(queue_priorities)
            })
            .collect::<Vec<_>>();

        let layers = if constants::VALIDATION_ENABLED {
            vec![constants::VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let mut extensions = constants::DEVICE_EXTENSIONS
            .iter()
            .map(|n| n.as_ptr())
            .collect::<Vec<_>>();

        if candidates[selected]
            .extensions
            .contains(&vk::KHR_PORTABILITY_SUBSET_EXTENSION.name)
        {
            info!("Enabling portability subset on the logical device.");
            extensions.push(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name.as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);

        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = instance
            .vk_instance
            .create_device(physical_device, &info, None)?;

        let graphics_queue = device.get_device_queue(indices.graphics, 0);
        let present_queue = device.get_device_queue(indices.present, 0);

        let memory_properties = instance
            .vk_instance
            .get_physical_device_memory_properties(physical_device);
        let limits = instance
            .vk_instance
            .get_physical_device_properties(physical_device)
            .limits;

        Ok(VulkanDevice {
            physical_device,
            vk_device: device,
            graphics_queue,
            present_queue,
            indices,
            memory_properties,
            limits,
        })
    }

    pub unsafe fn wait_idle(&self) -> Result<()> {
        self.vk_device.device_wait_idle()?;
        Ok(())
    }

    pub unsafe fn destroy(&mut self) {
        self.vk_device.destroy_device(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: QueueFamilySupport = QueueFamilySupport {
        graphics: true,
        present: true,
    };
    const GRAPHICS: QueueFamilySupport = QueueFamilySupport {
        graphics: true,
        present: false,
    };
    const PRESENT: QueueFamilySupport = QueueFamilySupport {
        graphics: false,
        present: true,
    };
    const COMPUTE: QueueFamilySupport = QueueFamilySupport {
        graphics: false,
        present: false,
    };

    fn suitable(name: &str) -> DeviceCandidate {
        DeviceCandidate {
            name: name.into(),
            queue_families: vec![BOTH],
            sampler_anisotropy: true,
            extensions: constants::DEVICE_EXTENSIONS.iter().copied().collect(),
            format_count: 1,
            present_mode_count: 1,
        }
    }

    #[test]
    fn shared_family_is_preferred_over_split() {
        let indices = QueueFamilyIndices::find(&[GRAPHICS, PRESENT, BOTH]).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 2, present: 2 });
        assert_eq!(indices.unique(), vec![2]);
    }

    #[test]
    fn split_families_are_accepted() {
        let indices = QueueFamilyIndices::find(&[COMPUTE, PRESENT, GRAPHICS]).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 2, present: 1 });
        assert!(!indices.is_shared());
        assert_eq!(indices.unique(), vec![2, 1]);
    }

    #[test]
    fn device_without_present_family_is_never_selected() {
        let mut headless = suitable("headless");
        headless.queue_families = vec![GRAPHICS, COMPUTE];

        assert_eq!(
            headless.check(),
            Err(SuitabilityError("required queue families"))
        );

        let error = select_device(&[headless]).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<EngineError>(),
            Some(EngineError::NoSuitableDevice)
        ));
    }

    #[test]
    fn each_criterion_rejects_on_its_own() {
        let mut no_anisotropy = suitable("a");
        no_anisotropy.sampler_anisotropy = false;
        assert_eq!(no_anisotropy.check(), Err(SuitabilityError("sampler anisotropy")));

        let mut no_swapchain = suitable("b");
        no_swapchain.extensions.clear();
        assert_eq!(
            no_swapchain.check(),
            Err(SuitabilityError("required device extensions"))
        );

        let mut no_formats = suitable("c");
        no_formats.format_count = 0;
        assert_eq!(
            no_formats.check(),
            Err(SuitabilityError("sufficient swapchain support"))
        );

        let mut no_modes = suitable("d");
        no_modes.present_mode_count = 0;
        assert!(no_modes.check().is_err());
    }

    #[test]
    fn first_qualifying_device_wins() {
        let mut integrated = suitable("integrated");
        integrated.sampler_anisotropy = false;
        let discrete = suitable("discrete");
        let other = suitable("other");

        let (index, indices) = select_device(&[integrated, discrete, other]).unwrap();
        assert_eq!(index, 1);
        assert_eq!(indices, QueueFamilyIndices { graphics: 0, present: 0 });
    }
}
