use std::time::Instant;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::loader::{LibloadingLoader, LIBRARY};
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::KhrSwapchainExtension;
use winit::window::Window;

use buffer::{write_uniforms, VulkanBuffer};
use command_buffer::{QuadDraw, VulkanCommandPool};
use descriptors::FrameDescriptors;
use device::VulkanDevice;
use self::image::VulkanTexture;
use instance::VulkanInstance;
use pipeline::VulkanPipeline;
use swapchain::VulkanSwapchain;
use sync::FrameSync;

use crate::assets::{ShaderSource, TextureSource};
use crate::config;
use crate::error::EngineError;
use crate::frame::{AcquireStatus, FrameBackend, PresentStatus};
use crate::scene::{UniformBufferObject, QUAD_INDICES, QUAD_VERTICES};

mod buffer;
mod command_buffer;
mod constants;
mod debug;
mod descriptors;
mod device;
mod framebuffer;
mod image;
mod instance;
mod memory;
mod pipeline;
mod render_pass;
mod swapchain;
mod sync;

/// Fills a default value step by step; if a step fails, `destroy` releases
/// whatever was created before it.
fn build_or_destroy<T: Default>(
    build: impl FnOnce(&mut T) -> Result<()>,
    destroy: impl FnOnce(&mut T),
) -> Result<T> {
    let mut value = T::default();

    if let Err(error) = build(&mut value) {
        destroy(&mut value);
        return Err(error);
    }

    Ok(value)
}

/// Vertex and index data in device-local memory.
#[derive(Debug, Default)]
struct QuadGeometry {
    vertices: VulkanBuffer,
    indices: VulkanBuffer,
    index_count: u32,
}

impl QuadGeometry {
    unsafe fn new(device: &VulkanDevice, pool: &VulkanCommandPool) -> Result<QuadGeometry> {
        let mut vertices = VulkanBuffer::new_device_local(
            device,
            pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;

        let indices = match VulkanBuffer::new_device_local(
            device,
            pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&QUAD_INDICES),
        ) {
            Ok(indices) => indices,
            Err(error) => {
                vertices.destroy(device);
                return Err(error);
            }
        };

        Ok(QuadGeometry {
            vertices,
            indices,
            index_count: QUAD_INDICES.len() as u32,
        })
    }

    unsafe fn destroy(&mut self, device: &VulkanDevice) {
        self.indices.destroy(device);
        self.vertices.destroy(device);
    }
}

/// Everything that depends on the swapchain, rebuilt as one unit.
#[derive(Debug, Default)]
struct PresentationChain {
    swapchain: VulkanSwapchain,
    render_pass: vk::RenderPass,
    pipeline: VulkanPipeline,
    framebuffers: Vec<vk::Framebuffer>,
    descriptors: FrameDescriptors,
    command_buffers: Vec<vk::CommandBuffer>,
}

/// Long-lived objects a presentation chain is built from.
struct ChainInputs<'a> {
    instance: &'a VulkanInstance,
    device: &'a VulkanDevice,
    pool: &'a VulkanCommandPool,
    set_layout: vk::DescriptorSetLayout,
    texture: &'a VulkanTexture,
    geometry: &'a QuadGeometry,
    shaders: &'a dyn ShaderSource,
}

impl PresentationChain {
    unsafe fn new(
        inputs: &ChainInputs,
        framebuffer_size: (u32, u32),
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<PresentationChain> {
        build_or_destroy(
            |chain: &mut PresentationChain| chain.build(inputs, framebuffer_size, old_swapchain),
            |chain| chain.destroy(inputs.device, inputs.pool),
        )
    }

    unsafe fn build(
        &mut self,
        inputs: &ChainInputs,
        framebuffer_size: (u32, u32),
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<()> {
        let device = inputs.device;

        self.swapchain =
            VulkanSwapchain::new(inputs.instance, device, framebuffer_size, old_swapchain)?;
        self.render_pass = render_pass::create_render_pass(device, self.swapchain.format)?;
        self.pipeline = VulkanPipeline::new(
            device,
            self.render_pass,
            inputs.set_layout,
            self.swapchain.extent,
            inputs.shaders,
        )?;
        self.framebuffers = framebuffer::create_framebuffers(
            device,
            self.render_pass,
            &self.swapchain.image_views,
            self.swapchain.extent,
        )?;
        self.descriptors = FrameDescriptors::new(
            device,
            inputs.set_layout,
            inputs.texture,
            self.swapchain.image_count(),
        )?;
        self.command_buffers = inputs.pool.record_all(
            device,
            &QuadDraw {
                render_pass: self.render_pass,
                framebuffers: &self.framebuffers,
                extent: self.swapchain.extent,
                pipeline: self.pipeline.handle,
                pipeline_layout: self.pipeline.layout,
                vertex_buffer: inputs.geometry.vertices.handle,
                index_buffer: inputs.geometry.indices.handle,
                index_count: inputs.geometry.index_count,
                descriptor_sets: &self.descriptors.sets,
            },
        )?;

        Ok(())
    }

    unsafe fn destroy(&mut self, device: &VulkanDevice, pool: &VulkanCommandPool) {
        pool.free(device, &self.command_buffers);
        self.command_buffers.clear();
        self.descriptors.destroy(device);
        framebuffer::destroy_framebuffers(device, &mut self.framebuffers);
        self.pipeline.destroy(device);
        device.vk_device.destroy_render_pass(self.render_pass, None);
        self.swapchain.destroy(device);
    }
}

/// Everything created on the logical device, in creation order.
#[derive(Debug, Default)]
struct DeviceResources {
    pool: VulkanCommandPool,
    set_layout: vk::DescriptorSetLayout,
    texture: VulkanTexture,
    geometry: QuadGeometry,
    chain: PresentationChain,
    sync: FrameSync,
}

impl DeviceResources {
    unsafe fn new(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        shaders: &dyn ShaderSource,
        textures: &dyn TextureSource,
        framebuffer_size: (u32, u32),
    ) -> Result<DeviceResources> {
        build_or_destroy(
            |resources: &mut DeviceResources| {
                resources.build(instance, device, shaders, textures, framebuffer_size)
            },
            |resources| resources.destroy(device),
        )
    }

    unsafe fn build(
        &mut self,
        instance: &VulkanInstance,
        device: &VulkanDevice,
        shaders: &dyn ShaderSource,
        textures: &dyn TextureSource,
        framebuffer_size: (u32, u32),
    ) -> Result<()> {
        self.pool = VulkanCommandPool::new(device)?;
        self.set_layout = pipeline::create_descriptor_set_layout(device)?;

        let pixels = textures.load(config::TEXTURE)?;
        pixels.validate(config::TEXTURE)?;
        self.texture = VulkanTexture::new(device, &self.pool, &pixels)?;
        self.geometry = QuadGeometry::new(device, &self.pool)?;

        self.chain = PresentationChain::new(
            &ChainInputs {
                instance,
                device,
                pool: &self.pool,
                set_layout: self.set_layout,
                texture: &self.texture,
                geometry: &self.geometry,
                shaders,
            },
            framebuffer_size,
            vk::SwapchainKHR::null(),
        )?;

        self.sync = FrameSync::new(device, config::MAX_FRAMES_IN_FLIGHT)?;

        Ok(())
    }

    /// Reverse creation order; null handles from a partial build are skipped
    /// by the driver.
    unsafe fn destroy(&mut self, device: &VulkanDevice) {
        self.sync.destroy(device);
        self.chain.destroy(device, &self.pool);
        self.geometry.destroy(device);
        self.texture.destroy(device);
        device
            .vk_device
            .destroy_descriptor_set_layout(self.set_layout, None);
        self.pool.destroy(device);
    }
}

/// The Vulkan side of the renderer: device context, long-lived resources,
/// the current presentation chain and the per-slot sync objects.
pub struct VulkanRenderer {
    _entry: Entry,
    instance: VulkanInstance,
    device: VulkanDevice,
    resources: DeviceResources,
    shaders: Box<dyn ShaderSource>,
    start: Instant,
}

impl VulkanRenderer {
    pub unsafe fn new(
        window: &Window,
        framebuffer_size: (u32, u32),
        shaders: Box<dyn ShaderSource>,
        textures: &dyn TextureSource,
    ) -> Result<VulkanRenderer> {
        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;

        let mut instance = VulkanInstance::new(window, &entry)?;
        let mut device = match VulkanDevice::new(&instance) {
            Ok(device) => device,
            Err(error) => {
                instance.destroy();
                return Err(error);
            }
        };

        let resources = match DeviceResources::new(
            &instance,
            &device,
            shaders.as_ref(),
            textures,
            framebuffer_size,
        ) {
            Ok(resources) => resources,
            Err(error) => {
                device.destroy();
                instance.destroy();
                return Err(error);
            }
        };

        info!(
            "Renderer ready with {} swapchain images.",
            resources.chain.swapchain.image_count()
        );

        Ok(VulkanRenderer {
            _entry: entry,
            instance,
            device,
            resources,
            shaders,
            start: Instant::now(),
        })
    }

    pub fn image_count(&self) -> usize {
        self.resources.chain.swapchain.image_count()
    }

    /// Releases everything in reverse creation order. Callers drain the
    /// frame scheduler first.
    pub unsafe fn destroy(&mut self) {
        self.resources.destroy(&self.device);
        self.device.destroy();
        self.instance.destroy();
    }
}

impl FrameBackend for VulkanRenderer {
    type Fence = vk::Fence;

    fn in_flight_fence(&self, slot: usize) -> vk::Fence {
        self.resources.sync.in_flight[slot]
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device
                .vk_device
                .wait_for_fences(&[fence], true, u64::MAX)?;
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.vk_device.reset_fences(&[fence])? };
        Ok(())
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireStatus> {
        let result = unsafe {
            self.device.vk_device.acquire_next_image_khr(
                self.resources.chain.swapchain.handle,
                u64::MAX,
                self.resources.sync.image_available[slot],
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, code)) => Ok(AcquireStatus::Acquired {
                image_index: image_index as usize,
                suboptimal: code == vk::SuccessCode::SUBOPTIMAL_KHR,
            }),
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
            Err(error) => Err(EngineError::SurfaceAcquire(error.to_string()).into()),
        }
    }

    fn update_uniforms(&mut self, image_index: usize) -> Result<()> {
        let elapsed = self.start.elapsed().as_secs_f32();
        let ubo = UniformBufferObject::at(elapsed, self.resources.chain.swapchain.extent);

        let buffer = &self.resources.chain.descriptors.uniform_buffers[image_index];
        let mut memory = unsafe { buffer.mapped(&self.device) };
        write_uniforms(&mut memory, &ubo)
    }

    fn submit(&mut self, slot: usize, image_index: usize) -> Result<()> {
        let wait_semaphores = &[self.resources.sync.image_available[slot]];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[self.resources.chain.command_buffers[image_index]];
        let signal_semaphores = &[self.resources.sync.render_finished[slot]];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        unsafe {
            self.device.vk_device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                self.resources.sync.in_flight[slot],
            )?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: usize) -> Result<PresentStatus> {
        let wait_semaphores = &[self.resources.sync.render_finished[slot]];
        let swapchains = &[self.resources.chain.swapchain.handle];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let result = unsafe {
            self.device
                .vk_device
                .queue_present_khr(self.device.present_queue, &present_info)
        };

        match result {
            Ok(vk::SuccessCode::SUBOPTIMAL_KHR) => Ok(PresentStatus::Suboptimal),
            Ok(_) => Ok(PresentStatus::Presented),
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(error) => Err(EngineError::SurfacePresent(error).into()),
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.wait_idle() }
    }

    fn recreate_swapchain(&mut self, framebuffer_size: (u32, u32)) -> Result<usize> {
        let inputs = ChainInputs {
            instance: &self.instance,
            device: &self.device,
            pool: &self.resources.pool,
            set_layout: self.resources.set_layout,
            texture: &self.resources.texture,
            geometry: &self.resources.geometry,
            shaders: self.shaders.as_ref(),
        };

        unsafe {
            let old_swapchain = self.resources.chain.swapchain.handle;
            let chain = PresentationChain::new(&inputs, framebuffer_size, old_swapchain)?;
            let mut old = std::mem::replace(&mut self.resources.chain, chain);
            old.destroy(&self.device, &self.resources.pool);
        }

        Ok(self.resources.chain.swapchain.image_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Staged {
        created: Vec<&'static str>,
    }

    impl Staged {
        fn build(&mut self, fail_at: Option<&'static str>) -> Result<()> {
            for step in ["pool", "texture", "chain", "sync"] {
                if fail_at == Some(step) {
                    return Err(anyhow!("{} failed", step));
                }
                self.created.push(step);
            }
            Ok(())
        }
    }

    #[test]
    fn late_failure_releases_earlier_objects() {
        let mut released = Vec::new();

        let error = build_or_destroy(
            |staged: &mut Staged| staged.build(Some("chain")),
            |staged| released.append(&mut staged.created),
        )
        .unwrap_err();

        assert_eq!(error.to_string(), "chain failed");
        assert_eq!(released, vec!["pool", "texture"]);
    }

    #[test]
    fn complete_build_is_kept() {
        let mut destroyed = false;

        let staged = build_or_destroy(|staged: &mut Staged| staged.build(None), |_| destroyed = true)
            .unwrap();

        assert_eq!(staged.created, vec!["pool", "texture", "chain", "sync"]);
        assert!(!destroyed);
    }
}
