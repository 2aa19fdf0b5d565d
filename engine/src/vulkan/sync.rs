use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

use super::device::VulkanDevice;

/// Per-slot semaphores and fences; fences start signaled so the first
/// wait on each slot returns immediately.
#[derive(Debug, Default)]
pub struct FrameSync {
    pub image_available: Vec<vk::Semaphore>,
    pub render_finished: Vec<vk::Semaphore>,
    pub in_flight: Vec<vk::Fence>,
}

impl FrameSync {
    pub unsafe fn new(device: &VulkanDevice, frames_in_flight: usize) -> Result<FrameSync> {
        let mut sync = FrameSync::default();

        if let Err(error) = sync.create(device, frames_in_flight) {
            sync.destroy(device);
            return Err(error);
        }

        Ok(sync)
    }

    unsafe fn create(&mut self, device: &VulkanDevice, frames_in_flight: usize) -> Result<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        for _ in 0..frames_in_flight {
            self.image_available
                .push(device.vk_device.create_semaphore(&semaphore_info, None)?);
            self.render_finished
                .push(device.vk_device.create_semaphore(&semaphore_info, None)?);
            self.in_flight
                .push(device.vk_device.create_fence(&fence_info, None)?);
        }

        Ok(())
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        self.in_flight
            .drain(..)
            .for_each(|f| device.vk_device.destroy_fence(f, None));
        self.render_finished
            .drain(..)
            .for_each(|s| device.vk_device.destroy_semaphore(s, None));
        self.image_available
            .drain(..)
            .for_each(|s| device.vk_device.destroy_semaphore(s, None));
    }
}
