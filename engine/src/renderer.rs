use anyhow::Result;
use vulkanalia::vk;

use crate::assets::{FileShaderSource, FileTextureSource};
use crate::config::{EngineConfig, MAX_FRAMES_IN_FLIGHT};
use crate::frame::{FrameOutcome, FrameScheduler};
use crate::vulkan::VulkanRenderer;
use crate::window::{AppWindow, WindowSurface};

pub struct Renderer {
    vk_renderer: VulkanRenderer,
    scheduler: FrameScheduler<vk::Fence>,
}

impl Renderer {
    /// Creates our Vulkan app.
    pub unsafe fn create(window: &AppWindow, config: &EngineConfig) -> Result<Self> {
        let shaders = FileShaderSource::new(&config.asset_root);
        let textures = FileTextureSource::new(&config.asset_root);

        let vk_renderer = VulkanRenderer::new(
            window.window(),
            window.framebuffer_size(),
            Box::new(shaders),
            &textures,
        )?;
        let scheduler = FrameScheduler::new(MAX_FRAMES_IN_FLIGHT, vk_renderer.image_count());

        Ok(Self {
            vk_renderer,
            scheduler,
        })
    }

    /// Renders a frame for our Vulkan app.
    pub fn render(&mut self, window: &mut AppWindow) -> Result<FrameOutcome> {
        self.scheduler.draw_frame(&mut self.vk_renderer, window)
    }

    pub fn notify_resized(&mut self) {
        self.scheduler.notify_resized();
    }

    /// Waits for in-flight frames, then destroys our Vulkan app even if the
    /// wait failed.
    pub unsafe fn destroy(&mut self) -> Result<()> {
        let drained = self.scheduler.drain(&mut self.vk_renderer);
        self.vk_renderer.destroy();
        drained
    }
}
