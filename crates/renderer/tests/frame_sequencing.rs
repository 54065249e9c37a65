//! Multi-frame sequencing against a simulated swapchain.

use deferred_renderer::{FrameStatus, FrameTarget, draw_frame};
use deferred_rhi::RhiResult;
use deferred_rhi::swapchain::{AcquireOutcome, PresentOutcome};
use deferred_rhi::vk;

/// A swapchain that goes stale whenever the surface changes size.
struct SimulatedSwapchain {
    image_count: u32,
    next_image: u32,
    /// Extent the swapchain was built for
    built_for: vk::Extent2D,
    /// Current drawable size of the window
    surface: vk::Extent2D,
    /// Present once more as suboptimal before reporting fine
    suboptimal_presents: u32,

    updates: u32,
    resizes: u32,
    presented: Vec<u32>,
    in_flight: Option<u32>,
}

impl SimulatedSwapchain {
    fn new(image_count: u32, extent: vk::Extent2D) -> Self {
        Self {
            image_count,
            next_image: 0,
            built_for: extent,
            surface: extent,
            suboptimal_presents: 0,
            updates: 0,
            resizes: 0,
            presented: Vec::new(),
            in_flight: None,
        }
    }

    fn resize_window(&mut self, width: u32, height: u32) {
        self.surface = vk::Extent2D { width, height };
    }
}

impl FrameTarget for SimulatedSwapchain {
    fn is_minimized(&self) -> bool {
        self.surface.width == 0 || self.surface.height == 0
    }

    fn update(&mut self) -> RhiResult<()> {
        // The previous frame's fence has been waited on.
        self.in_flight = None;
        self.updates += 1;
        Ok(())
    }

    fn acquire(&mut self) -> RhiResult<AcquireOutcome> {
        if self.built_for != self.surface {
            return Ok(AcquireOutcome::OutOfDate);
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal: false,
        })
    }

    fn submit(&mut self, image_index: u32) -> RhiResult<()> {
        assert_eq!(self.in_flight, None, "previous frame still in flight");
        self.in_flight = Some(image_index);
        Ok(())
    }

    fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome> {
        assert_eq!(self.in_flight, Some(image_index));
        self.presented.push(image_index);
        if self.suboptimal_presents > 0 {
            self.suboptimal_presents -= 1;
            return Ok(PresentOutcome::Suboptimal);
        }
        Ok(PresentOutcome::Presented)
    }

    fn resize(&mut self) -> RhiResult<()> {
        assert!(!self.is_minimized(), "resized while minimized");
        self.built_for = self.surface;
        self.next_image = 0;
        self.in_flight = None;
        self.resizes += 1;
        Ok(())
    }
}

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

#[test]
fn test_steady_frames_cycle_swap_images() {
    let mut target = SimulatedSwapchain::new(3, extent(800, 600));
    for _ in 0..7 {
        assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Presented);
    }
    assert_eq!(target.presented, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(target.updates, 7);
    assert_eq!(target.resizes, 0);
}

#[test]
fn test_window_resize_drops_one_frame() {
    let mut target = SimulatedSwapchain::new(2, extent(800, 600));
    draw_frame(&mut target).unwrap();

    target.resize_window(1024, 768);
    assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Dropped);
    assert_eq!(target.resizes, 1);
    assert_eq!(target.presented, vec![0]);

    assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Presented);
    assert_eq!(target.presented, vec![0, 0]);
    assert_eq!(target.resizes, 1);
}

#[test]
fn test_minimize_and_restore() {
    let mut target = SimulatedSwapchain::new(3, extent(800, 600));
    draw_frame(&mut target).unwrap();

    target.resize_window(0, 0);
    for _ in 0..5 {
        assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Skipped);
    }
    assert_eq!(target.updates, 1);
    assert_eq!(target.resizes, 0);

    target.resize_window(800, 600);
    assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Presented);
    assert_eq!(target.resizes, 0);

    target.resize_window(0, 0);
    draw_frame(&mut target).unwrap();
    target.resize_window(640, 480);
    assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Dropped);
    assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Presented);
    assert_eq!(target.resizes, 1);
}

#[test]
fn test_suboptimal_present_rebuilds_after_showing_frame() {
    let mut target = SimulatedSwapchain::new(2, extent(800, 600));
    target.suboptimal_presents = 1;

    assert_eq!(
        draw_frame(&mut target).unwrap(),
        FrameStatus::PresentedThenResized
    );
    assert_eq!(target.presented, vec![0]);
    assert_eq!(target.resizes, 1);

    assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Presented);
    assert_eq!(target.resizes, 1);
}
