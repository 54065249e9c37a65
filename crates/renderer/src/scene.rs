//! The boundary between the frame orchestrator and scene content.
//!
//! The orchestrator owns the device, the render graph, the descriptor pool
//! and the pipeline registry. A [`Scene`] declares how many descriptors it
//! needs, fills the pool once in [`Scene::prepare`], writes its uniform
//! buffers in [`Scene::update`] and records draw commands for each pass.

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use deferred_platform::KeyCode;
use deferred_rhi::RhiResult;
use deferred_rhi::command::CommandBuffer;
use deferred_rhi::descriptor::{DescriptorPool, DescriptorTally};
use deferred_rhi::device::Device;

use crate::passes::RenderGraph;
use crate::pipelines::PipelineRegistry;

/// What a scene gets to build its GPU resources.
pub struct SceneContext<'a> {
    pub device: &'a Arc<Device>,
    /// Pool sized from the scene's own tally
    pub pool: &'a mut DescriptorPool,
    pub graph: &'a RenderGraph,
    pub pipelines: &'a mut PipelineRegistry,
    /// Directory of compiled SPIR-V modules
    pub shader_dir: &'a Path,
    /// Current swapchain extent
    pub extent: vk::Extent2D,
}

/// Scene content rendered by the deferred pipeline.
pub trait Scene {
    /// Uniform buffers the scene binds, over all sets.
    fn buffer_count(&self) -> u32;

    /// Combined image samplers the scene binds, over all sets.
    fn texture_count(&self) -> u32;

    /// Descriptor sets the scene allocates.
    fn descriptor_set_count(&self) -> u32;

    /// Exact pool capacity the scene needs.
    fn descriptor_tally(&self) -> DescriptorTally {
        DescriptorTally::new()
            .with_buffers(self.buffer_count())
            .with_textures(self.texture_count())
            .with_sets(self.descriptor_set_count())
    }

    /// Uploads geometry and textures, allocates descriptor sets and
    /// registers pipelines. Called once, before any command is recorded.
    fn prepare(&mut self, ctx: SceneContext<'_>) -> RhiResult<()>;

    /// Advances by `delta_secs` and writes the uniform buffers.
    ///
    /// The previous frame's GPU work has completed when this is called.
    fn update(&mut self, delta_secs: f32) -> RhiResult<()>;

    fn render_depth(&self, cmd: &CommandBuffer, pipelines: &PipelineRegistry) -> RhiResult<()>;

    fn render_geometry(&self, cmd: &CommandBuffer, pipelines: &PipelineRegistry)
    -> RhiResult<()>;

    fn render_lighting(&self, cmd: &CommandBuffer, pipelines: &PipelineRegistry)
    -> RhiResult<()>;

    fn render_final(&self, cmd: &CommandBuffer, pipelines: &PipelineRegistry) -> RhiResult<()>;

    /// The swapchain-sized passes were recreated at `extent`.
    ///
    /// Descriptor sets sampling pass attachments must be rewritten here.
    fn resize_extent(
        &mut self,
        extent: vk::Extent2D,
        pool: &DescriptorPool,
        graph: &RenderGraph,
    ) -> RhiResult<()>;

    fn key_down(&mut self, key: KeyCode);

    fn key_up(&mut self, key: KeyCode);
}
