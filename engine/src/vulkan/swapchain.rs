use anyhow::Result;
use log::*;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{KhrSurfaceExtension, KhrSwapchainExtension};

use super::device::VulkanDevice;
use super::image;
use super::instance::VulkanInstance;
use crate::error::EngineError;

#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn get(instance: &VulkanInstance, device: &VulkanDevice) -> Result<Self> {
        let vk_instance = &instance.vk_instance;
        Ok(Self {
            capabilities: vk_instance
                .get_physical_device_surface_capabilities_khr(device.physical_device, instance.surface)?,
            formats: vk_instance
                .get_physical_device_surface_formats_khr(device.physical_device, instance.surface)?,
            present_modes: vk_instance.get_physical_device_surface_present_modes_khr(
                device.physical_device,
                instance.surface,
            )?,
        })
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .ok_or_else(|| EngineError::NoSuitableFormat.into())
}

pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|m| *m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// `u32::MAX` in the current extent means the surface takes any size.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D::builder()
        .width(framebuffer_size.0.clamp(min.width, max.width))
        .height(framebuffer_size.1.clamp(min.height, max.height))
        .build()
}

pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

/// Presentable images plus one view per image.
#[derive(Debug, Default)]
pub struct VulkanSwapchain {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
}

impl VulkanSwapchain {
    /// Builds a chain, recycling `old_swapchain` if it is not null. The
    /// caller still owns and destroys the old handle.
    pub unsafe fn new(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        framebuffer_size: (u32, u32),
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<VulkanSwapchain> {
        let support = SwapchainSupport::get(instance, device)?;

        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, framebuffer_size);
        let image_count = choose_image_count(&support.capabilities);

        debug!(
            "Swapchain: {:?}/{:?}, {:?}, {}x{}, {} images requested.",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            extent.width,
            extent.height,
            image_count
        );

        let queue_family_indices = &[device.indices.graphics, device.indices.present];
        let mut info = vk::SwapchainCreateInfoKHR::builder()
            .surface(instance.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        info = if device.indices.is_shared() {
            info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            info.image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(queue_family_indices)
        };

        let handle = device.vk_device.create_swapchain_khr(&info, None)?;
        let images = device.vk_device.get_swapchain_images_khr(handle)?;

        let mut swapchain = VulkanSwapchain {
            handle,
            format: surface_format.format,
            extent,
            images,
            image_views: Vec::new(),
        };

        for index in 0..swapchain.images.len() {
            let swapchain_image = swapchain.images[index];
            match image::create_image_view(device, swapchain_image, swapchain.format) {
                Ok(view) => swapchain.image_views.push(view),
                Err(error) => {
                    swapchain.destroy(device);
                    return Err(error);
                }
            }
        }

        Ok(swapchain)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        self.image_views
            .drain(..)
            .for_each(|v| device.vk_device.destroy_image_view(v, None));
        device.vk_device.destroy_swapchain_khr(self.handle, None);
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 1000,
            },
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn surface_format_requires_exact_srgb_match() {
        let wanted = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            wanted,
        ];
        assert_eq!(choose_surface_format(&formats).unwrap(), wanted);

        let error = choose_surface_format(&formats[..1]).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<EngineError>(),
            Some(EngineError::NoSuitableFormat)
        ));
    }

    #[test]
    fn mailbox_preferred_fifo_otherwise() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_surface_extent_is_used_verbatim() {
        let caps = capabilities((640, 480), 2, 0);
        assert_eq!(
            choose_extent(&caps, (1920, 1080)),
            vk::Extent2D {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn flexible_surface_extent_is_clamped() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 0);
        let extent = |size| {
            let e = choose_extent(&caps, size);
            (e.width, e.height)
        };

        assert_eq!(extent((800, 600)), (800, 600));
        assert_eq!(extent((50, 5000)), (100, 1000));
        assert_eq!(extent((4000, 1)), (2000, 100));
    }

    #[test]
    fn image_count_is_one_above_minimum_within_cap() {
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 3, 3)), 3);
    }
}
