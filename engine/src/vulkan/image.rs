use anyhow::Result;
use log::*;
use vulkanalia::prelude::v1_0::*;

use super::buffer::VulkanBuffer;
use super::command_buffer::VulkanCommandPool;
use super::device::VulkanDevice;
use super::memory;
use crate::assets::TexturePixels;
use crate::error::EngineError;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Access and stage masks for one supported layout change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<LayoutTransition> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        (old, new) => Err(EngineError::UnsupportedTransition { old, new }.into()),
    }
}

pub unsafe fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let subresource_range = vk::ImageSubresourceRange::builder()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1);

    let info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(subresource_range);

    Ok(device.vk_device.create_image_view(&info, None)?)
}

pub fn sampler_info(max_anisotropy: f32) -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
        .build()
}

/// The sampled quad texture: image, memory, view and sampler.
#[derive(Debug, Default)]
pub struct VulkanTexture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

impl VulkanTexture {
    pub unsafe fn new(
        device: &VulkanDevice,
        pool: &VulkanCommandPool,
        pixels: &TexturePixels,
    ) -> Result<VulkanTexture> {
        debug!(
            "Uploading {}x{} texture ({} bytes).",
            pixels.width,
            pixels.height,
            pixels.byte_len()
        );

        let mut staging = VulkanBuffer::staging(device, &pixels.pixels)?;
        let mut texture = VulkanTexture::default();
        let uploaded = texture.upload(device, pool, &staging, pixels.width, pixels.height);
        staging.destroy(device);

        match uploaded {
            Ok(()) => Ok(texture),
            Err(error) => {
                texture.destroy(device);
                Err(error)
            }
        }
    }

    unsafe fn upload(
        &mut self,
        device: &VulkanDevice,
        pool: &VulkanCommandPool,
        staging: &VulkanBuffer,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.create_image(device, width, height)?;

        VulkanTexture::transition_layout(
            device,
            pool,
            self.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        VulkanTexture::copy_from_buffer(device, pool, staging.handle, self.image, width, height)?;
        VulkanTexture::transition_layout(
            device,
            pool,
            self.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        self.view = create_image_view(device, self.image, TEXTURE_FORMAT)?;

        let info = sampler_info(device.limits.max_sampler_anisotropy);
        self.sampler = device.vk_device.create_sampler(&info, None)?;

        Ok(())
    }

    unsafe fn create_image(&mut self, device: &VulkanDevice, width: u32, height: u32) -> Result<()> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(TEXTURE_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::_1);

        self.image = device.vk_device.create_image(&info, None)?;

        let requirements = device.vk_device.get_image_memory_requirements(self.image);
        let memory_type = memory::find_memory_type(
            &device.memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        self.memory = device.vk_device.allocate_memory(&info, None)?;
        device
            .vk_device
            .bind_image_memory(self.image, self.memory, 0)?;

        Ok(())
    }

    unsafe fn transition_layout(
        device: &VulkanDevice,
        pool: &VulkanCommandPool,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<()> {
        let masks = transition_masks(old_layout, new_layout)?;

        let command_buffer = pool.begin_single_time(device)?;

        let subresource = vk::ImageSubresourceRange::builder()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource)
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        device.vk_device.cmd_pipeline_barrier(
            command_buffer,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[] as &[vk::MemoryBarrier],
            &[] as &[vk::BufferMemoryBarrier],
            &[barrier],
        );

        pool.end_single_time(device, command_buffer)
    }

    unsafe fn copy_from_buffer(
        device: &VulkanDevice,
        pool: &VulkanCommandPool,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let command_buffer = pool.begin_single_time(device)?;

        let subresource = vk::ImageSubresourceLayers::builder()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1);

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(subresource)
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        device.vk_device.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        pool.end_single_time(device, command_buffer)
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        device.vk_device.destroy_sampler(self.sampler, None);
        device.vk_device.destroy_image_view(self.view, None);
        device.vk_device.destroy_image(self.image, None);
        device.vk_device.free_memory(self.memory, None);
        *self = VulkanTexture::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transitions_use_transfer_then_fragment_stages() {
        let before = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(before.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(before.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(before.dst_access, vk::AccessFlags::TRANSFER_WRITE);

        let after = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(after.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(after.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(after.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn other_transitions_are_rejected() {
        let error = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap_err();

        assert!(matches!(
            error.downcast_ref::<EngineError>(),
            Some(EngineError::UnsupportedTransition {
                old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            })
        ));
        assert!(transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        )
        .is_err());
    }

    #[test]
    fn sampler_uses_device_anisotropy() {
        let info = sampler_info(16.0);

        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 16.0);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.unnormalized_coordinates, vk::FALSE);
    }
}
