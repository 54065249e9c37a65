//! Per-frame sequencing.
//!
//! [`draw_frame`] drives one frame through update, acquire, submit and
//! present, and decides when the swapchain must be rebuilt. It talks to
//! the GPU only through [`FrameTarget`], so the protocol can be exercised
//! without a device.
//!
//! - A minimized target renders nothing.
//! - An out-of-date acquire drops the frame and resizes once; nothing is
//!   submitted or presented.
//! - A suboptimal or out-of-date present resizes once after presenting.

use tracing::debug;

use deferred_rhi::RhiResult;
use deferred_rhi::swapchain::{AcquireOutcome, PresentOutcome};

/// The GPU side of a frame.
pub trait FrameTarget {
    /// Whether the drawable area is zero.
    fn is_minimized(&self) -> bool;

    /// Waits for the previous frame's GPU work, then lets the scene advance
    /// and write its uniform buffers.
    fn update(&mut self) -> RhiResult<()>;

    /// Acquires the next swapchain image, signaling "image acquired".
    fn acquire(&mut self) -> RhiResult<AcquireOutcome>;

    /// Submits the command buffer of `image_index`, waiting on "image
    /// acquired" and signaling "rendering finished".
    fn submit(&mut self, image_index: u32) -> RhiResult<()>;

    /// Presents `image_index` once "rendering finished" is signaled.
    fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Rebuilds the swapchain and everything sized by it.
    fn resize(&mut self) -> RhiResult<()>;
}

/// How a frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The window is minimized; nothing happened.
    Skipped,
    /// Acquire reported a stale swapchain; the frame was dropped and the
    /// swapchain rebuilt.
    Dropped,
    /// The image was presented.
    Presented,
    /// The image was presented, then the swapchain rebuilt.
    PresentedThenResized,
}

/// Runs one frame on `target`.
///
/// # Errors
///
/// Any error other than a stale or suboptimal swapchain is returned and is
/// fatal to the caller.
pub fn draw_frame<T: FrameTarget>(target: &mut T) -> RhiResult<FrameStatus> {
    if target.is_minimized() {
        return Ok(FrameStatus::Skipped);
    }

    target.update()?;

    let image_index = match target.acquire()? {
        AcquireOutcome::Ready { image_index, .. } => image_index,
        AcquireOutcome::OutOfDate => {
            debug!("Swapchain out of date on acquire, dropping frame");
            target.resize()?;
            return Ok(FrameStatus::Dropped);
        }
    };

    target.submit(image_index)?;

    let outcome = target.present(image_index)?;
    if outcome.needs_resize() {
        debug!("Present returned {:?}, resizing", outcome);
        target.resize()?;
        return Ok(FrameStatus::PresentedThenResized);
    }
    Ok(FrameStatus::Presented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deferred_rhi::RhiError;
    use deferred_rhi::vk;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Update,
        Acquire,
        Submit(u32),
        Present(u32),
        Resize,
    }

    /// Records calls and models the two frame semaphores.
    struct MockTarget {
        minimized: bool,
        acquire: AcquireOutcome,
        present: PresentOutcome,
        submit_error: Option<vk::Result>,
        calls: Vec<Call>,
        image_acquired: bool,
        rendering_finished: bool,
    }

    impl MockTarget {
        fn new(acquire: AcquireOutcome, present: PresentOutcome) -> Self {
            Self {
                minimized: false,
                acquire,
                present,
                submit_error: None,
                calls: Vec::new(),
                image_acquired: false,
                rendering_finished: false,
            }
        }

        fn ready(index: u32) -> AcquireOutcome {
            AcquireOutcome::Ready {
                image_index: index,
                suboptimal: false,
            }
        }

        fn count(&self, call: Call) -> usize {
            self.calls.iter().filter(|&&c| c == call).count()
        }
    }

    impl FrameTarget for MockTarget {
        fn is_minimized(&self) -> bool {
            self.minimized
        }

        fn update(&mut self) -> RhiResult<()> {
            self.calls.push(Call::Update);
            Ok(())
        }

        fn acquire(&mut self) -> RhiResult<AcquireOutcome> {
            self.calls.push(Call::Acquire);
            if matches!(self.acquire, AcquireOutcome::Ready { .. }) {
                self.image_acquired = true;
            }
            Ok(self.acquire)
        }

        fn submit(&mut self, image_index: u32) -> RhiResult<()> {
            self.calls.push(Call::Submit(image_index));
            if let Some(error) = self.submit_error {
                return Err(RhiError::VulkanError(error));
            }
            assert!(self.image_acquired, "submit must wait on image acquired");
            self.image_acquired = false;
            self.rendering_finished = true;
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome> {
            self.calls.push(Call::Present(image_index));
            assert!(
                self.rendering_finished,
                "present must wait on rendering finished"
            );
            self.rendering_finished = false;
            Ok(self.present)
        }

        fn resize(&mut self) -> RhiResult<()> {
            self.calls.push(Call::Resize);
            Ok(())
        }
    }

    #[test]
    fn test_normal_frame_runs_in_order() {
        let mut target = MockTarget::new(MockTarget::ready(2), PresentOutcome::Presented);
        let status = draw_frame(&mut target).unwrap();

        assert_eq!(status, FrameStatus::Presented);
        assert_eq!(
            target.calls,
            vec![Call::Update, Call::Acquire, Call::Submit(2), Call::Present(2)]
        );
    }

    #[test]
    fn test_minimized_frame_is_a_no_op() {
        let mut target = MockTarget::new(MockTarget::ready(0), PresentOutcome::Presented);
        target.minimized = true;

        assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Skipped);
        assert!(target.calls.is_empty());
    }

    #[test]
    fn test_out_of_date_acquire_resizes_without_submit() {
        let mut target = MockTarget::new(AcquireOutcome::OutOfDate, PresentOutcome::Presented);
        let status = draw_frame(&mut target).unwrap();

        assert_eq!(status, FrameStatus::Dropped);
        assert_eq!(target.calls, vec![Call::Update, Call::Acquire, Call::Resize]);
        assert_eq!(target.count(Call::Resize), 1);
    }

    #[test]
    fn test_suboptimal_present_resizes_once_after_presenting() {
        let mut target = MockTarget::new(MockTarget::ready(1), PresentOutcome::Suboptimal);
        let status = draw_frame(&mut target).unwrap();

        assert_eq!(status, FrameStatus::PresentedThenResized);
        assert_eq!(
            target.calls,
            vec![
                Call::Update,
                Call::Acquire,
                Call::Submit(1),
                Call::Present(1),
                Call::Resize
            ]
        );
    }

    #[test]
    fn test_out_of_date_present_resizes_once() {
        let mut target = MockTarget::new(MockTarget::ready(0), PresentOutcome::OutOfDate);
        draw_frame(&mut target).unwrap();
        assert_eq!(target.count(Call::Resize), 1);
        assert_eq!(target.calls.last(), Some(&Call::Resize));
    }

    #[test]
    fn test_suboptimal_acquire_still_renders() {
        let acquire = AcquireOutcome::Ready {
            image_index: 0,
            suboptimal: true,
        };
        let mut target = MockTarget::new(acquire, PresentOutcome::Presented);
        assert_eq!(draw_frame(&mut target).unwrap(), FrameStatus::Presented);
        assert_eq!(target.count(Call::Resize), 0);
    }

    #[test]
    fn test_submit_failure_is_fatal_and_skips_present() {
        let mut target = MockTarget::new(MockTarget::ready(0), PresentOutcome::Presented);
        target.submit_error = Some(vk::Result::ERROR_DEVICE_LOST);

        let result = draw_frame(&mut target);
        assert!(matches!(
            result,
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert_eq!(target.count(Call::Present(0)), 0);
        assert_eq!(target.count(Call::Resize), 0);
    }
}
