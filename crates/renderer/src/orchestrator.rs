//! The Vulkan frame orchestrator.
//!
//! [`FrameOrchestrator`] owns every GPU object of the renderer and drives
//! frames through [`draw_frame`]. Command buffers are recorded once per
//! swap image, containing all four passes, and replayed every frame; they
//! are re-recorded only after a resize.
//!
//! # Resource Destruction Order
//!
//! Fields drop in declaration order, which is the reverse of creation:
//! command buffers and synchronization first, then the scene and its
//! pipelines, the descriptor pool, the render graph, the swapchain, the
//! surface, the device and finally the instance. `Drop` waits for the
//! device to go idle before any of that happens.

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use deferred_core::{Config, Timer};
use deferred_platform::{KeyCode, Surface, Window, is_zero_area};
use deferred_rhi::command::CommandBufferSet;
use deferred_rhi::descriptor::DescriptorPool;
use deferred_rhi::device::Device;
use deferred_rhi::instance::Instance;
use deferred_rhi::physical_device::{clamp_sample_count, select_physical_device};
use deferred_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use deferred_rhi::sync::{FrameSemaphores, ImageFences};
use deferred_rhi::{RhiError, RhiResult};

use crate::frame::{FrameStatus, FrameTarget, draw_frame};
use crate::passes::{PassKind, RenderGraph};
use crate::pipelines::PipelineRegistry;
use crate::scene::{Scene, SceneContext};

/// Longest frame delta handed to the scene, in seconds.
const MAX_FRAME_DELTA_SECS: f32 = 0.1;

/// Stage at which submitted work waits for the acquired image.
const ACQUIRE_WAIT_STAGES: [vk::PipelineStageFlags; 1] =
    [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

/// Submit info for one frame: wait "image acquired" before writing color,
/// signal "rendering finished" when done.
fn frame_submit_info<'a>(
    image_acquired: &'a [vk::Semaphore; 1],
    command_buffer: &'a [vk::CommandBuffer; 1],
    rendering_finished: &'a [vk::Semaphore; 1],
) -> vk::SubmitInfo<'a> {
    vk::SubmitInfo::default()
        .wait_semaphores(image_acquired)
        .wait_dst_stage_mask(&ACQUIRE_WAIT_STAGES)
        .command_buffers(command_buffer)
        .signal_semaphores(rendering_finished)
}

/// Index of the framebuffer `kind` renders into for swap image `image`.
fn framebuffer_index(kind: PassKind, image: usize) -> usize {
    match kind {
        PassKind::Final => image,
        PassKind::Depth | PassKind::Geometry | PassKind::Lighting => 0,
    }
}

/// Owns the device, swapchain, render graph and scene, and renders frames.
pub struct FrameOrchestrator<S: Scene> {
    command_buffers: CommandBufferSet,
    image_fences: ImageFences,
    semaphores: FrameSemaphores,
    scene: S,
    pipelines: PipelineRegistry,
    pool: DescriptorPool,
    graph: RenderGraph,
    swapchain: Swapchain,
    // Held only to outlive the swapchain and the device.
    _surface: Surface,
    device: Arc<Device>,
    _instance: Instance,

    /// Latest drawable size reported by the window
    requested_extent: vk::Extent2D,
    /// Swap image whose fence guards the most recent submission
    last_submitted: Option<u32>,
    clear_color: [f32; 4],
    timer: Timer,
}

impl<S: Scene> FrameOrchestrator<S> {
    /// Creates every GPU object for `window` and prepares `scene`.
    ///
    /// # Arguments
    ///
    /// * `window` - The window to present to
    /// * `config` - Renderer configuration (validation, sample count,
    ///   shadow map size, shader directory, clear color)
    /// * `scene` - Scene content; its descriptor tally sizes the pool
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created, or if the
    /// scene's declared tally does not match what it allocated.
    pub fn new(window: &Window, config: &Config, mut scene: S) -> RhiResult<Self> {
        let requested_extent = window.drawable_extent();
        info!(
            "Initializing deferred renderer ({}x{})",
            requested_extent.width, requested_extent.height
        );

        let required_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(&required_extensions, config.renderer.validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            requested_extent,
        )?;

        let samples = clamp_sample_count(config.renderer.samples, device.max_sample_count());
        if samples.as_raw() != config.renderer.samples {
            info!(
                "Using {:?} samples per pixel ({} requested, device max {:?})",
                samples,
                config.renderer.samples,
                device.max_sample_count()
            );
        }
        let graph = RenderGraph::new(
            device.clone(),
            config.renderer.shadow_map_size,
            samples,
            &swapchain,
        )?;

        let tally = scene.descriptor_tally();
        let mut pool = DescriptorPool::from_tally(device.clone(), tally)?;
        let mut pipelines = PipelineRegistry::new(device.clone());
        let shader_dir: PathBuf = config.renderer.shader_dir.clone();
        scene.prepare(SceneContext {
            device: &device,
            pool: &mut pool,
            graph: &graph,
            pipelines: &mut pipelines,
            shader_dir: &shader_dir,
            extent: swapchain.extent(),
        })?;
        pool.verify_exhausted()?;

        let semaphores = FrameSemaphores::new(device.clone())?;
        let image_fences = ImageFences::new(device.clone(), swapchain.image_count())?;
        let command_buffers = CommandBufferSet::allocate(device.clone(), swapchain.image_count())?;

        let orchestrator = Self {
            command_buffers,
            image_fences,
            semaphores,
            scene,
            pipelines,
            pool,
            graph,
            swapchain,
            _surface: surface,
            device,
            _instance: instance,
            requested_extent,
            last_submitted: None,
            clear_color: config.renderer.clear_color,
            timer: Timer::new(),
        };
        orchestrator.record_commands()?;

        info!(
            "Renderer initialized: {} swap image(s), {} pipeline(s), descriptors {}",
            orchestrator.swapchain.image_count(),
            orchestrator.pipelines.len(),
            tally
        );
        Ok(orchestrator)
    }

    /// Renders one frame.
    ///
    /// # Errors
    ///
    /// Every returned error is fatal; stale swapchains are handled here.
    pub fn draw_frame(&mut self) -> RhiResult<FrameStatus> {
        draw_frame(self)
    }

    /// Records the window's new drawable size.
    ///
    /// The swapchain is rebuilt right away unless the window is minimized;
    /// a zero-area size pauses rendering until the next non-zero one.
    pub fn on_resize(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.requested_extent = extent;
        if is_zero_area(extent) {
            debug!("Window minimized, pausing rendering");
            return Ok(());
        }
        self.resize()
    }

    pub fn key_down(&mut self, key: KeyCode) {
        self.scene.key_down(key);
    }

    pub fn key_up(&mut self, key: KeyCode) {
        self.scene.key_up(key);
    }

    /// Records the four passes into the command buffer of every swap image.
    fn record_commands(&self) -> RhiResult<()> {
        for image in 0..self.command_buffers.len() {
            let cmd = self.command_buffers.get(image);
            cmd.begin_reusable()?;
            for kind in PassKind::ALL {
                let pass = self.graph.pass(kind);
                cmd.begin_render_pass(
                    pass.render_pass()?.handle(),
                    pass.framebuffer(framebuffer_index(kind, image))?,
                    pass.extent(),
                    &pass.clear_values(self.clear_color),
                );
                match kind {
                    PassKind::Depth => self.scene.render_depth(&cmd, &self.pipelines)?,
                    PassKind::Geometry => self.scene.render_geometry(&cmd, &self.pipelines)?,
                    PassKind::Lighting => self.scene.render_lighting(&cmd, &self.pipelines)?,
                    PassKind::Final => self.scene.render_final(&cmd, &self.pipelines)?,
                }
                cmd.end_render_pass();
            }
            cmd.end()?;
        }
        debug!("Recorded {} command buffer(s)", self.command_buffers.len());
        Ok(())
    }
}

impl<S: Scene> FrameTarget for FrameOrchestrator<S> {
    fn is_minimized(&self) -> bool {
        is_zero_area(self.requested_extent)
    }

    fn update(&mut self) -> RhiResult<()> {
        if let Some(previous) = self.last_submitted {
            self.image_fences.get(previous)?.wait(u64::MAX)?;
        }
        let delta = self.timer.delta_secs_capped(MAX_FRAME_DELTA_SECS);
        self.scene.update(delta)
    }

    fn acquire(&mut self) -> RhiResult<AcquireOutcome> {
        self.swapchain.acquire_next_image(self.semaphores.image_acquired())
    }

    fn submit(&mut self, image_index: u32) -> RhiResult<()> {
        let fence = self.image_fences.get(image_index)?;
        fence.wait(u64::MAX)?;
        fence.reset()?;

        let image_acquired = [self.semaphores.image_acquired()];
        let command_buffer = [self.command_buffers.get(image_index as usize).handle()];
        let rendering_finished = [self.semaphores.rendering_finished()];
        let submit_info =
            frame_submit_info(&image_acquired, &command_buffer, &rendering_finished);

        // SAFETY: the command buffer was fully recorded, and its fence was
        // just waited on and reset, so neither is in use.
        unsafe {
            self.device.submit_graphics(&[submit_info], fence.handle())?;
        }
        self.last_submitted = Some(image_index);
        Ok(())
    }

    fn present(&mut self, image_index: u32) -> RhiResult<PresentOutcome> {
        self.swapchain.present(
            self.device.present_queue(),
            image_index,
            self.semaphores.rendering_finished(),
        )
    }

    fn resize(&mut self) -> RhiResult<()> {
        if is_zero_area(self.requested_extent) {
            return Ok(());
        }

        self.device.wait_idle()?;
        self.last_submitted = None;

        self.graph.release_swapchain_sized();
        self.swapchain.recreate(self.requested_extent)?;
        self.graph.recreate_swapchain_sized(&self.swapchain)?;
        self.pipelines.rebuild(&self.graph, &PassKind::SWAPCHAIN_SIZED)?;

        let extent = self.swapchain.extent();
        self.scene.resize_extent(extent, &self.pool, &self.graph)?;

        let image_count = self.swapchain.image_count();
        if self.image_fences.len() != image_count as usize {
            debug!(
                "Swap image count changed {} -> {}",
                self.image_fences.len(),
                image_count
            );
            self.image_fences = ImageFences::new(self.device.clone(), image_count)?;
            self.command_buffers = CommandBufferSet::allocate(self.device.clone(), image_count)?;
        }

        self.record_commands()?;
        info!("Resized to {}x{}", extent.width, extent.height);
        Ok(())
    }
}

impl<S: Scene> Drop for FrameOrchestrator<S> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }
        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_submit_waits_acquired_and_signals_finished() {
        let acquired = [vk::Semaphore::from_raw(1)];
        let finished = [vk::Semaphore::from_raw(2)];
        let command_buffer = [vk::CommandBuffer::from_raw(3)];
        let info = frame_submit_info(&acquired, &command_buffer, &finished);

        assert_eq!(info.wait_semaphore_count, 1);
        assert_eq!(info.signal_semaphore_count, 1);
        assert_eq!(info.command_buffer_count, 1);
        unsafe {
            assert_eq!(*info.p_wait_semaphores, acquired[0]);
            assert_eq!(*info.p_signal_semaphores, finished[0]);
            assert_eq!(
                *info.p_wait_dst_stage_mask,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            );
        }
    }

    #[test]
    fn test_only_final_uses_per_image_framebuffers() {
        assert_eq!(framebuffer_index(PassKind::Final, 2), 2);
        assert_eq!(framebuffer_index(PassKind::Depth, 2), 0);
        assert_eq!(framebuffer_index(PassKind::Geometry, 2), 0);
        assert_eq!(framebuffer_index(PassKind::Lighting, 2), 0);
    }
}
