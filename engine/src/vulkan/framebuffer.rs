use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

use super::device::VulkanDevice;

pub unsafe fn create_framebuffers(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    image_views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for view in image_views {
        let attachments = &[*view];
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match device.vk_device.create_framebuffer(&create_info, None) {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(error) => {
                destroy_framebuffers(device, &mut framebuffers);
                return Err(error.into());
            }
        }
    }

    Ok(framebuffers)
}

pub unsafe fn destroy_framebuffers(device: &VulkanDevice, framebuffers: &mut Vec<vk::Framebuffer>) {
    framebuffers
        .drain(..)
        .for_each(|f| device.vk_device.destroy_framebuffer(f, None));
}
