use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::{bail, Result};
use log::*;
use vulkanalia::prelude::v1_0::*;

use super::command_buffer::VulkanCommandPool;
use super::device::VulkanDevice;
use super::memory;
use crate::scene::UniformBufferObject;

/// A buffer and the allocation bound to it at offset 0.
#[derive(Copy, Clone, Debug, Default)]
pub struct VulkanBuffer {
    pub handle: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl VulkanBuffer {
    /// Creates the buffer object only; nothing backs it yet.
    pub unsafe fn create(
        device: &VulkanDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<vk::Buffer> {
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        Ok(device.vk_device.create_buffer(&info, None)?)
    }

    pub unsafe fn allocate_and_bind(
        device: &VulkanDevice,
        buffer: vk::Buffer,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        let requirements = device.vk_device.get_buffer_memory_requirements(buffer);

        let memory_type = memory::find_memory_type(
            &device.memory_properties,
            requirements.memory_type_bits,
            properties,
        )?;

        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = device.vk_device.allocate_memory(&info, None)?;
        device.vk_device.bind_buffer_memory(buffer, memory, 0)?;

        Ok(memory)
    }

    pub unsafe fn new(
        device: &VulkanDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<VulkanBuffer> {
        let handle = VulkanBuffer::create(device, size, usage)?;
        let memory = match VulkanBuffer::allocate_and_bind(device, handle, properties) {
            Ok(memory) => memory,
            Err(error) => {
                device.vk_device.destroy_buffer(handle, None);
                return Err(error);
            }
        };

        Ok(VulkanBuffer {
            handle,
            memory,
            size,
        })
    }

    /// Host-visible, host-coherent scratch buffer filled with `data`.
    pub unsafe fn staging(device: &VulkanDevice, data: &[u8]) -> Result<VulkanBuffer> {
        let mut staging = VulkanBuffer::new(
            device,
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        if let Err(error) = staging.mapped(device).write(0, data) {
            staging.destroy(device);
            return Err(error);
        }

        Ok(staging)
    }

    /// Device-local buffer with `usage | TRANSFER_DST`, filled through staging.
    pub unsafe fn new_device_local(
        device: &VulkanDevice,
        pool: &VulkanCommandPool,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> Result<VulkanBuffer> {
        let mut buffer = VulkanBuffer::new(
            device,
            data.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        if let Err(error) = buffer.upload_via_staging(device, pool, data) {
            buffer.destroy(device);
            return Err(error);
        }

        Ok(buffer)
    }

    /// Copies `data` in through a temporary staging buffer; blocks until done.
    pub unsafe fn upload_via_staging(
        &self,
        device: &VulkanDevice,
        pool: &VulkanCommandPool,
        data: &[u8],
    ) -> Result<()> {
        if data.len() as vk::DeviceSize > self.size {
            bail!(
                "Upload of {} bytes exceeds {} byte buffer.",
                data.len(),
                self.size
            );
        }

        trace!("Staging {} bytes into device-local buffer.", data.len());

        let mut staging = VulkanBuffer::staging(device, data)?;
        let copied = VulkanBuffer::copy(device, pool, staging.handle, self.handle, staging.size);
        staging.destroy(device);

        copied
    }

    unsafe fn copy(
        device: &VulkanDevice,
        pool: &VulkanCommandPool,
        source: vk::Buffer,
        destination: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<()> {
        let command_buffer = pool.begin_single_time(device)?;

        let regions = vk::BufferCopy::builder().size(size);
        device
            .vk_device
            .cmd_copy_buffer(command_buffer, source, destination, &[regions]);

        pool.end_single_time(device, command_buffer)
    }

    pub unsafe fn mapped<'a>(&self, device: &'a VulkanDevice) -> MappedMemory<'a> {
        MappedMemory {
            device: &device.vk_device,
            memory: self.memory,
            size: self.size,
        }
    }

    pub unsafe fn destroy(&mut self, device: &VulkanDevice) {
        device.vk_device.destroy_buffer(self.handle, None);
        device.vk_device.free_memory(self.memory, None);
        *self = VulkanBuffer::default();
    }
}

/// Host-writable view of an allocation.
pub trait HostVisibleMemory {
    fn size(&self) -> vk::DeviceSize;
    fn write(&mut self, offset: vk::DeviceSize, bytes: &[u8]) -> Result<()>;
}

/// Maps, copies and unmaps on every write; the memory must be host-coherent.
pub struct MappedMemory<'a> {
    device: &'a Device,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl HostVisibleMemory for MappedMemory<'_> {
    fn size(&self) -> vk::DeviceSize {
        self.size
    }

    fn write(&mut self, offset: vk::DeviceSize, bytes: &[u8]) -> Result<()> {
        check_bounds(self.size, offset, bytes.len())?;

        unsafe {
            let memory = self.device.map_memory(
                self.memory,
                offset,
                bytes.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            memcpy(bytes.as_ptr(), memory.cast(), bytes.len());
            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }
}

fn check_bounds(size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> Result<()> {
    if offset + len as vk::DeviceSize > size {
        bail!(
            "Write of {} bytes at offset {} exceeds {} byte allocation.",
            len,
            offset,
            size
        );
    }
    Ok(())
}

pub fn write_uniforms<M: HostVisibleMemory + ?Sized>(
    memory: &mut M,
    ubo: &UniformBufferObject,
) -> Result<()> {
    memory.write(0, bytemuck::bytes_of(ubo))
}
