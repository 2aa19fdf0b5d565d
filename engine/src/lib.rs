#![allow(clippy::missing_safety_doc)]

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use log::*;
use renderer::Renderer;

pub mod assets;
pub mod config;
pub mod error;
pub mod frame;
pub mod scene;
pub mod window;

mod renderer;
mod vulkan;

pub use config::EngineConfig;
pub use error::EngineError;

use window::{AppWindow, WindowSurface};

pub struct Engine {
    window: AppWindow,
    renderer: Renderer,
    resized: Rc<Cell<bool>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Engine> {
        // Window
        let mut window = AppWindow::new(&config)?;

        let resized = Rc::new(Cell::new(false));
        let flag = resized.clone();
        window.set_resize_callback(move |_, _| flag.set(true));

        let renderer = unsafe { Renderer::create(&window, &config)? };

        Ok(Engine {
            window,
            renderer,
            resized,
        })
    }

    /// Runs until the window is closed, then drains and tears down.
    pub fn run(mut self) -> Result<()> {
        let looped = self.main_loop();
        if let Err(error) = &looped {
            error!("Frame loop stopped: {}", error);
        }

        let destroyed = unsafe { self.renderer.destroy() };
        looped.and(destroyed)
    }

    fn main_loop(&mut self) -> Result<()> {
        loop {
            self.window.poll_events();
            if self.window.should_close() {
                return Ok(());
            }

            if self.resized.replace(false) {
                self.renderer.notify_resized();
            }

            self.renderer.render(&mut self.window)?;
        }
    }
}
