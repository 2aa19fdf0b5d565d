use std::time::Duration;

use anyhow::Result;
use log::*;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowBuilder};

use crate::config::EngineConfig;

/// The part of the windowing layer the frame loop depends on.
pub trait WindowSurface {
    /// Current drawable size in pixels; `(0, 0)` while minimized.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Blocks until at least one window event has been dispatched.
    fn wait_events(&mut self);

    fn should_close(&self) -> bool;
}

type ResizeCallback = Box<dyn FnMut(u32, u32)>;

/// A winit window driven by explicit polling, one pump per loop tick.
pub struct AppWindow {
    event_loop: EventLoop<()>,
    window: Window,
    close_requested: bool,
    on_resize: Option<ResizeCallback>,
}

impl AppWindow {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .with_resizable(true)
            .build(&event_loop)?;

        Ok(Self {
            event_loop,
            window,
            close_requested: false,
            on_resize: None,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn set_resize_callback(&mut self, callback: impl FnMut(u32, u32) + 'static) {
        self.on_resize = Some(Box::new(callback));
    }

    /// Dispatches pending events without blocking.
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        let close_requested = &mut self.close_requested;
        let on_resize = &mut self.on_resize;

        let status = self.event_loop.pump_events(timeout, |event, _| {
            if let Event::WindowEvent { event, .. } = event {
                match event {
                    WindowEvent::CloseRequested => {
                        debug!("Close requested.");
                        *close_requested = true;
                    }
                    WindowEvent::Resized(size) => {
                        trace!("Window resized to {}x{}.", size.width, size.height);
                        if let Some(callback) = on_resize.as_mut() {
                            callback(size.width, size.height);
                        }
                    }
                    _ => {}
                }
            }
        });

        if let PumpStatus::Exit(code) = status {
            debug!("Event loop exited with code {}.", code);
            self.close_requested = true;
        }
    }
}

impl WindowSurface for AppWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }
}
