use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

use super::buffer::VulkanBuffer;
use super::device::VulkanDevice;
use super::image::VulkanTexture;
use crate::scene::UniformBufferObject;

pub fn pool_sizes(image_count: u32) -> [vk::DescriptorPoolSize; 2] {
    let ubo_size = vk::DescriptorPoolSize::builder()
        .type_(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(image_count)
        .build();

    let sampler_size = vk::DescriptorPoolSize::builder()
        .type_(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(image_count)
        .build();

    [ubo_size, sampler_size]
}

/// One uniform buffer and one descriptor set per swapchain image.
#[derive(Debug, Default)]
pub struct FrameDescriptors {
    pub uniform_buffers: Vec<VulkanBuffer>,
    pub pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
}

impl FrameDescriptors {
    pub unsafe fn new(
        device: &VulkanDevice,
        set_layout: vk::DescriptorSetLayout,
        texture: &VulkanTexture,
        image_count: usize,
    ) -> Result<FrameDescriptors> {
        let mut descriptors = FrameDescriptors::default();

        if let Err(error) = descriptors.build(device, set_layout, texture, image_count) {
            descriptors.destroy(device);
            return Err(error);
        }

        Ok(descriptors)
    }

    unsafe fn build(
        &mut self,
        device: &VulkanDevice,
        set_layout: vk::DescriptorSetLayout,
        texture: &VulkanTexture,
        image_count: usize,
    ) -> Result<()> {
        for _ in 0..image_count {
            self.uniform_buffers.push(VulkanBuffer::new(
                device,
                UniformBufferObject::size(),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_COHERENT | vk::MemoryPropertyFlags::HOST_VISIBLE,
            )?);
        }

        let pool_sizes = pool_sizes(image_count as u32);
        let info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(image_count as u32);

        self.pool = device.vk_device.create_descriptor_pool(&info, None)?;

        let layouts = vec![set_layout; image_count];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        self.sets = device.vk_device.allocate_descriptor_sets(&info)?;

        for (set, uniform) in self.sets.iter().zip(&self.uniform_buffers) {
            let info = vk::DescriptorBufferInfo::builder()
                .buffer(uniform.handle)
                .offset(0)
                .range(UniformBufferObject::size());

            let buffer_info = &[info];
            let ubo_write = vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(buffer_info);

            let info = vk::DescriptorImageInfo::builder()
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image_view(texture.view)
                .sampler(texture.sampler);

            let image_info = &[info];
            let sampler_write = vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(1)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(image_info);

            device.vk_device.update_descriptor_sets(
                &[ubo_write, sampler_write],
                &[] as &[vk::CopyDescriptorSet],
            );
        }

        Ok(())
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        // Sets go with the pool.
        device.vk_device.destroy_descriptor_pool(self.pool, None);
        self.uniform_buffers
            .iter_mut()
            .for_each(|b| b.destroy(device));
        *self = FrameDescriptors::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_holds_one_of_each_per_image() {
        let sizes = pool_sizes(3);

        assert_eq!(sizes[0].type_, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].type_, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 3);
    }
}
