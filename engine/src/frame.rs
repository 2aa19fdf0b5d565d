//! Frame pacing against the presentation engine.
//!
//! `FrameScheduler` owns the only cross-frame state: the current frame slot
//! and the table recording which slot's fence last claimed each presentable
//! image. Everything GPU-side sits behind [`FrameBackend`].

use std::fmt;

use anyhow::Result;
use log::*;

use crate::error::EngineError;
use crate::window::WindowSurface;

/// Outcome of acquiring the next presentable image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    Acquired { image_index: usize, suboptimal: bool },
    OutOfDate,
}

/// Outcome of queueing an image for presentation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Work was submitted and the image queued for presentation.
    Presented,
    /// The swapchain was rebuilt before anything was submitted.
    Skipped,
}

/// GPU operations one frame needs, addressed by frame slot and image index.
///
/// Fatal statuses are returned as errors; only out-of-date and suboptimal
/// are reported through the status enums.
pub trait FrameBackend {
    type Fence: Copy + PartialEq + fmt::Debug;

    fn in_flight_fence(&self, slot: usize) -> Self::Fence;
    fn wait_for_fence(&mut self, fence: Self::Fence) -> Result<()>;
    fn reset_fence(&mut self, fence: Self::Fence) -> Result<()>;

    /// Signals the slot's image-available semaphore once the image is ready.
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireStatus>;
    fn update_uniforms(&mut self, image_index: usize) -> Result<()>;
    /// Waits on the slot's image-available semaphore, signals its
    /// render-finished semaphore and fence.
    fn submit(&mut self, slot: usize, image_index: usize) -> Result<()>;
    /// Waits on the slot's render-finished semaphore.
    fn present(&mut self, slot: usize, image_index: usize) -> Result<PresentStatus>;

    fn wait_idle(&mut self) -> Result<()>;
    /// Rebuilds every swapchain-dependent object; returns the new image count.
    fn recreate_swapchain(&mut self, framebuffer_size: (u32, u32)) -> Result<usize>;
}

#[derive(Debug)]
pub struct FrameScheduler<F> {
    frame: usize,
    frames_in_flight: usize,
    images_in_flight: Vec<Option<F>>,
    /// Slots whose fence was reset but never handed to a submission.
    unsubmitted: Vec<bool>,
    recreate_requested: bool,
}

impl<F: Copy + PartialEq + fmt::Debug> FrameScheduler<F> {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        assert!(frames_in_flight > 0, "at least one frame slot is required");
        Self {
            frame: 0,
            frames_in_flight,
            images_in_flight: vec![None; image_count],
            unsubmitted: vec![false; frames_in_flight],
            recreate_requested: false,
        }
    }

    pub fn current_frame(&self) -> usize {
        self.frame
    }

    /// Fence currently owning each presentable image, if any.
    pub fn images_in_flight(&self) -> &[Option<F>] {
        &self.images_in_flight
    }

    pub fn recreate_requested(&self) -> bool {
        self.recreate_requested
    }

    /// Records an external resize; serviced after the next present.
    pub fn notify_resized(&mut self) {
        self.recreate_requested = true;
    }

    pub fn draw_frame<B, W>(&mut self, backend: &mut B, window: &mut W) -> Result<FrameOutcome>
    where
        B: FrameBackend<Fence = F>,
        W: WindowSurface + ?Sized,
    {
        let slot = self.frame;
        let in_flight = backend.in_flight_fence(slot);

        if !self.unsubmitted[slot] {
            backend.wait_for_fence(in_flight)?;
        }

        let image_index = match backend.acquire_next_image(slot)? {
            AcquireStatus::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    self.recreate_requested = true;
                }
                image_index
            }
            AcquireStatus::OutOfDate => {
                info!("Swapchain out of date at acquire; recreating.");
                self.recreate(backend, window)?;
                return Ok(FrameOutcome::Skipped);
            }
        };

        let Some(owner) = self.images_in_flight.get(image_index).copied() else {
            return Err(EngineError::SurfaceAcquire(format!(
                "image index {} outside swapchain of {} images",
                image_index,
                self.images_in_flight.len()
            ))
            .into());
        };

        if let Some(fence) = owner {
            backend.wait_for_fence(fence)?;
        }
        self.images_in_flight[image_index] = Some(in_flight);

        backend.update_uniforms(image_index)?;

        backend.reset_fence(in_flight)?;
        self.unsubmitted[slot] = true;
        if let Err(error) = backend.submit(slot, image_index) {
            // Nothing will signal this fence now.
            self.images_in_flight
                .iter_mut()
                .filter(|owner| **owner == Some(in_flight))
                .for_each(|owner| *owner = None);
            return Err(error);
        }
        self.unsubmitted[slot] = false;

        match backend.present(slot, image_index)? {
            PresentStatus::OutOfDate => {
                info!("Swapchain out of date at present; recreating.");
                self.recreate(backend, window)?;
                return Ok(FrameOutcome::Presented);
            }
            PresentStatus::Suboptimal => self.recreate_requested = true,
            PresentStatus::Presented => {}
        }

        if self.recreate_requested {
            info!("Swapchain suboptimal or window resized; recreating.");
            self.recreate(backend, window)?;
        }

        self.frame = (self.frame + 1) % self.frames_in_flight;

        Ok(FrameOutcome::Presented)
    }

    /// Blocks on every slot's fence so no GPU work is pending. Slots whose
    /// last submission failed are skipped.
    pub fn drain<B>(&mut self, backend: &mut B) -> Result<()>
    where
        B: FrameBackend<Fence = F>,
    {
        debug!("Draining {} frame slots.", self.frames_in_flight);
        for slot in 0..self.frames_in_flight {
            if self.unsubmitted[slot] {
                warn!("Frame slot {} has no pending submission; not waiting.", slot);
                continue;
            }
            let fence = backend.in_flight_fence(slot);
            backend.wait_for_fence(fence)?;
        }
        self.images_in_flight.iter_mut().for_each(|owner| *owner = None);
        Ok(())
    }

    fn recreate<B, W>(&mut self, backend: &mut B, window: &mut W) -> Result<()>
    where
        B: FrameBackend<Fence = F>,
        W: WindowSurface + ?Sized,
    {
        let Some(size) = wait_for_drawable_size(window) else {
            info!("Window closed while minimized; swapchain left as is.");
            return Ok(());
        };
        backend.wait_idle()?;

        let image_count = backend.recreate_swapchain(size)?;
        self.images_in_flight = vec![None; image_count];
        self.recreate_requested = false;

        info!(
            "Swapchain recreated at {}x{} with {} images.",
            size.0, size.1, image_count
        );
        Ok(())
    }
}

/// Waits out a minimized window; returns the first non-zero size seen, or
/// `None` once the window is asked to close.
pub fn wait_for_drawable_size<W: WindowSurface + ?Sized>(window: &mut W) -> Option<(u32, u32)> {
    loop {
        if window.should_close() {
            return None;
        }
        let (width, height) = window.framebuffer_size();
        if width > 0 && height > 0 {
            return Some((width, height));
        }
        window.wait_events();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shrunk {
        sizes: Vec<(u32, u32)>,
        waits: usize,
        close_after: Option<usize>,
    }

    impl WindowSurface for Shrunk {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.sizes[self.waits.min(self.sizes.len() - 1)]
        }

        fn wait_events(&mut self) {
            self.waits += 1;
        }

        fn should_close(&self) -> bool {
            self.close_after.is_some_and(|waits| self.waits >= waits)
        }
    }

    #[test]
    fn zero_sized_window_blocks_until_restored() {
        let mut window = Shrunk {
            sizes: vec![(0, 0), (0, 0), (640, 0), (640, 480)],
            waits: 0,
            close_after: None,
        };

        assert_eq!(wait_for_drawable_size(&mut window), Some((640, 480)));
        assert_eq!(window.waits, 3);
    }

    #[test]
    fn visible_window_does_not_wait() {
        let mut window = Shrunk {
            sizes: vec![(800, 600)],
            waits: 0,
            close_after: None,
        };

        assert_eq!(wait_for_drawable_size(&mut window), Some((800, 600)));
        assert_eq!(window.waits, 0);
    }

    #[test]
    fn closing_a_minimized_window_stops_the_wait() {
        let mut window = Shrunk {
            sizes: vec![(0, 0)],
            waits: 0,
            close_after: Some(2),
        };

        assert_eq!(wait_for_drawable_size(&mut window), None);
        assert_eq!(window.waits, 2);
    }

    #[test]
    fn new_scheduler_owns_nothing() {
        let scheduler = FrameScheduler::<u32>::new(2, 3);

        assert_eq!(scheduler.current_frame(), 0);
        assert_eq!(scheduler.images_in_flight(), &[None, None, None]);
        assert!(!scheduler.recreate_requested());
    }
}
