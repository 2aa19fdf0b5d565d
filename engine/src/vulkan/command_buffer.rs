use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

use super::device::VulkanDevice;

/// Handles the per-image draw recording reads.
#[derive(Copy, Clone, Debug)]
pub struct QuadDraw<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffers: &'a [vk::Framebuffer],
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub descriptor_sets: &'a [vk::DescriptorSet],
}

#[derive(Debug, Default)]
pub struct VulkanCommandPool {
    pub handle: vk::CommandPool,
}

impl VulkanCommandPool {
    pub unsafe fn new(device: &VulkanDevice) -> Result<VulkanCommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::empty())
            .queue_family_index(device.indices.graphics);

        let handle = device.vk_device.create_command_pool(&info, None)?;

        Ok(VulkanCommandPool { handle })
    }

    /// Allocates and records one primary command buffer per framebuffer.
    pub unsafe fn record_all(
        &self,
        device: &VulkanDevice,
        draw: &QuadDraw,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(draw.framebuffers.len() as u32);

        let command_buffers = device.vk_device.allocate_command_buffers(&allocate_info)?;

        record_or_release(
            &command_buffers,
            |i, command_buffer| VulkanCommandPool::record(device, command_buffer, draw, i),
            |all| self.free(device, all),
        )?;

        Ok(command_buffers)
    }

    unsafe fn record(
        device: &VulkanDevice,
        command_buffer: vk::CommandBuffer,
        draw: &QuadDraw,
        image_index: usize,
    ) -> Result<()> {
        let vk_device = &device.vk_device;

        let info = vk::CommandBufferBeginInfo::builder();
        vk_device.begin_command_buffer(command_buffer, &info)?;

        let render_area = full_scissor(draw.extent);
        let clear_values = &[clear_black()];
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(draw.render_pass)
            .framebuffer(draw.framebuffers[image_index])
            .render_area(render_area)
            .clear_values(clear_values);

        vk_device.cmd_begin_render_pass(command_buffer, &info, vk::SubpassContents::INLINE);

        vk_device.cmd_bind_pipeline(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            draw.pipeline,
        );

        vk_device.cmd_set_viewport(command_buffer, 0, &[full_viewport(draw.extent)]);
        vk_device.cmd_set_scissor(command_buffer, 0, &[full_scissor(draw.extent)]);

        vk_device.cmd_bind_vertex_buffers(command_buffer, 0, &[draw.vertex_buffer], &[0]);
        vk_device.cmd_bind_index_buffer(command_buffer, draw.index_buffer, 0, vk::IndexType::UINT16);
        vk_device.cmd_bind_descriptor_sets(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            draw.pipeline_layout,
            0,
            &[draw.descriptor_sets[image_index]],
            &[],
        );

        vk_device.cmd_draw_indexed(command_buffer, draw.index_count, 1, 0, 0, 0);
        vk_device.cmd_end_render_pass(command_buffer);

        vk_device.end_command_buffer(command_buffer)?;

        Ok(())
    }

    pub unsafe fn begin_single_time(&self, device: &VulkanDevice) -> Result<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(self.handle)
            .command_buffer_count(1);

        let command_buffer = device.vk_device.allocate_command_buffers(&info)?[0];

        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(error) = device.vk_device.begin_command_buffer(command_buffer, &info) {
            self.free(device, &[command_buffer]);
            return Err(error.into());
        }

        Ok(command_buffer)
    }

    /// Submits to the graphics queue and blocks until it drains.
    pub unsafe fn end_single_time(
        &self,
        device: &VulkanDevice,
        command_buffer: vk::CommandBuffer,
    ) -> Result<()> {
        let command_buffers = &[command_buffer];
        let info = vk::SubmitInfo::builder().command_buffers(command_buffers);

        // A buffer that never reached the queue can be freed right away.
        let submitted = device
            .vk_device
            .end_command_buffer(command_buffer)
            .and_then(|_| {
                device
                    .vk_device
                    .queue_submit(device.graphics_queue, &[info], vk::Fence::null())
            });
        if let Err(error) = submitted {
            self.free(device, command_buffers);
            return Err(error.into());
        }

        device.vk_device.queue_wait_idle(device.graphics_queue)?;
        self.free(device, command_buffers);

        Ok(())
    }

    pub unsafe fn free(&self, device: &VulkanDevice, command_buffers: &[vk::CommandBuffer]) {
        if !command_buffers.is_empty() {
            device
                .vk_device
                .free_command_buffers(self.handle, command_buffers);
        }
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        device.vk_device.destroy_command_pool(self.handle, None);
    }
}

/// Records every buffer in order; on the first failure all of them go to
/// `release`, recorded or not.
fn record_or_release<T: Copy>(
    buffers: &[T],
    mut record: impl FnMut(usize, T) -> Result<()>,
    release: impl FnOnce(&[T]),
) -> Result<()> {
    for (i, buffer) in buffers.iter().enumerate() {
        if let Err(error) = record(i, *buffer) {
            release(buffers);
            return Err(error);
        }
    }
    Ok(())
}

pub fn clear_black() -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        },
    }
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
        .build()
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D::builder()
        .offset(vk::Offset2D { x: 0, y: 0 })
        .extent(extent)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_state_covers_the_whole_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };

        let viewport = full_viewport(extent);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (1280.0, 720.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn clears_to_opaque_black() {
        let value = clear_black();
        assert_eq!(unsafe { value.color.float32 }, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn failed_recording_releases_every_buffer() {
        let mut recorded = Vec::new();
        let mut released = Vec::new();

        let result = record_or_release(
            &[10u64, 11, 12],
            |i, buffer| {
                recorded.push(buffer);
                if i == 1 {
                    anyhow::bail!("recording failed");
                }
                Ok(())
            },
            |all| released.extend_from_slice(all),
        );

        assert!(result.is_err());
        assert_eq!(recorded, vec![10, 11]);
        assert_eq!(released, vec![10, 11, 12]);
    }

    #[test]
    fn successful_recording_keeps_buffers() {
        let mut released = false;

        let result = record_or_release(&[1u64, 2], |_, _| Ok(()), |_| released = true);

        assert!(result.is_ok());
        assert!(!released);
    }
}
