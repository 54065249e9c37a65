//! Synchronization primitives.
//!
//! - [`Semaphore`]: GPU-to-GPU ordering between acquire, submit and present
//! - [`Fence`]: GPU-to-CPU completion signal
//! - [`FrameSemaphores`]: the two semaphores reused by every frame
//! - [`ImageFences`]: one fence per swap image, guarding its command buffer
//!
//! A frame waits on "image acquired" before its color output stage runs and
//! signals "rendering finished", which presentation waits on. The image's
//! fence is signaled by the same submission, so the CPU knows when that
//! image's command buffer may be submitted again.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_semaphore(self.semaphore, None) };
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait on it
    /// returns immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `VulkanError(TIMEOUT)` on timeout, or the driver error.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?;
        }
        Ok(())
    }

    pub fn reset(&self) -> Result<(), RhiError> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_fence(self.fence, None) };
    }
}

/// The "image acquired" and "rendering finished" semaphores.
pub struct FrameSemaphores {
    image_acquired: Semaphore,
    rendering_finished: Semaphore,
}

impl FrameSemaphores {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_acquired: Semaphore::new(device.clone())?,
            rendering_finished: Semaphore::new(device)?,
        })
    }

    /// Signaled by acquire, waited on by submit.
    #[inline]
    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired.handle()
    }

    /// Signaled by submit, waited on by present.
    #[inline]
    pub fn rendering_finished(&self) -> vk::Semaphore {
        self.rendering_finished.handle()
    }
}

/// One fence per swap image, created signaled.
pub struct ImageFences {
    fences: Vec<Fence>,
}

impl ImageFences {
    pub fn new(device: Arc<Device>, image_count: u32) -> RhiResult<Self> {
        let fences = (0..image_count)
            .map(|_| Fence::new(device.clone(), true))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created {} image fence(s)", fences.len());
        Ok(Self { fences })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// The fence guarding swap image `image_index`.
    pub fn get(&self, image_index: u32) -> RhiResult<&Fence> {
        self.fences.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "no fence for swap image {} ({} fences)",
                image_index,
                self.fences.len()
            ))
        })
    }
}
