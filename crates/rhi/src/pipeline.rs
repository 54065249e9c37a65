//! Graphics pipelines bound to a render pass.
//!
//! A [`GraphicsPipelineDesc`] owns everything needed to build a pipeline
//! (SPIR-V, vertex layout, set layouts, fixed-function state), so the same
//! description can be rebuilt against a recreated pass. Viewport and scissor
//! are static and cover the pass extent; a resize rebuilds the pipeline.
//! The sample count always comes from the render pass.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deferred_rhi::device::Device;
//! use deferred_rhi::pipeline::{CullMode, GraphicsPipelineDesc};
//! use deferred_rhi::render_pass::RenderPass;
//! use deferred_rhi::shader::SpirvCode;
//! use deferred_rhi::vertex::Vertex;
//! use ash::vk;
//!
//! # use deferred_rhi::RhiResult;
//! # fn example(device: Arc<Device>, pass: &RenderPass, extent: vk::Extent2D) -> RhiResult<()> {
//! let desc = GraphicsPipelineDesc::new("gbuffer")
//!     .vertex_shader(SpirvCode::load("shaders/spirv/gbuffer.vert.spv")?)
//!     .fragment_shader(SpirvCode::load("shaders/spirv/gbuffer.frag.spv")?)
//!     .vertex_layout::<Vertex>()
//!     .cull_mode(CullMode::Back);
//! let pipeline = desc.build(device, pass, extent)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::{Shader, ShaderStage, SpirvCode};
use crate::vertex::VertexLayout;

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Set layouts, in set-number order
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Self> {
        let create_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(descriptor_set_layouts);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// A graphics pipeline together with its layout.
///
/// Field order destroys the pipeline before its layout.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    layout: PipelineLayout,
    name: String,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Layout used when binding descriptor sets and push constants.
    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Destroyed pipeline '{}'", self.name);
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth comparison operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Less,
    LessOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Constant and slope depth bias, used by shadow-map pipelines.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub slope_factor: f32,
}

/// Everything needed to (re)build a graphics pipeline.
///
/// Defaults: triangle list, fill, back-face culling, counter-clockwise front
/// face, depth test and write with `LESS`, no blending.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineDesc {
    name: String,
    vertex_shader: Option<SpirvCode>,
    fragment_shader: Option<SpirvCode>,
    vertex_binding: Option<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    cull_mode: CullMode,
    front_face: FrontFace,
    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: CompareOp,
    depth_bias: Option<DepthBias>,
}

impl GraphicsPipelineDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex_shader: None,
            fragment_shader: None,
            vertex_binding: None,
            vertex_attributes: Vec::new(),
            set_layouts: Vec::new(),
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
            depth_bias: None,
        }
    }

    pub fn vertex_shader(mut self, code: SpirvCode) -> Self {
        self.vertex_shader = Some(code);
        self
    }

    /// Sets the fragment shader. Depth-only pipelines leave it unset.
    pub fn fragment_shader(mut self, code: SpirvCode) -> Self {
        self.fragment_shader = Some(code);
        self
    }

    /// Reads vertices of type `V` from binding 0.
    pub fn vertex_layout<V: VertexLayout>(mut self) -> Self {
        self.vertex_binding = Some(V::binding_description());
        self.vertex_attributes = V::attribute_descriptions();
        self
    }

    /// Appends a descriptor set layout; sets are numbered in call order.
    pub fn set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout);
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    pub fn depth_test_enable(mut self, enable: bool) -> Self {
        self.depth_test_enable = enable;
        self
    }

    pub fn depth_write_enable(mut self, enable: bool) -> Self {
        self.depth_write_enable = enable;
        self
    }

    pub fn depth_compare_op(mut self, op: CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    pub fn depth_bias(mut self, constant_factor: f32, slope_factor: f32) -> Self {
        self.depth_bias = Some(DepthBias {
            constant_factor,
            slope_factor,
        });
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> RhiResult<&SpirvCode> {
        self.vertex_shader.as_ref().ok_or_else(|| {
            RhiError::PipelineError(format!("pipeline '{}' has no vertex shader", self.name))
        })
    }

    /// Builds the pipeline for subpass 0 of `render_pass`, with a static
    /// viewport and scissor covering `extent` and the pass's sample count.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] without a vertex shader, or the
    /// Vulkan error.
    pub fn build(
        &self,
        device: Arc<Device>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> RhiResult<Pipeline> {
        let vertex_code = self.validate()?;

        let vertex_shader = Shader::new(device.clone(), vertex_code, ShaderStage::Vertex)?;
        let fragment_shader = self
            .fragment_shader
            .as_ref()
            .map(|code| Shader::new(device.clone(), code, ShaderStage::Fragment))
            .transpose()?;

        let mut shader_stages = vec![vertex_shader.stage_create_info()];
        if let Some(fragment) = fragment_shader.as_ref() {
            shader_stages.push(fragment.stage_create_info());
        }

        let layout = PipelineLayout::new(device.clone(), &self.set_layouts)?;

        let bindings: Vec<_> = self.vertex_binding.into_iter().collect();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [full_viewport(extent)];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let bias = self.depth_bias;
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .depth_bias_enable(bias.is_some())
            .depth_bias_constant_factor(bias.map_or(0.0, |b| b.constant_factor))
            .depth_bias_slope_factor(bias.map_or(0.0, |b| b.slope_factor));

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(render_pass.samples())
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test_enable)
            .depth_write_enable(self.depth_write_enable)
            .depth_compare_op(self.depth_compare_op.to_vk())
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let blend_attachments = opaque_blend_attachments(render_pass.color_count());
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?[0]
        };

        debug!(
            "Built pipeline '{}' for {}x{} ({:?} samples)",
            self.name,
            extent.width,
            extent.height,
            render_pass.samples()
        );

        Ok(Pipeline {
            device,
            pipeline,
            layout,
            name: self.name.clone(),
        })
    }
}

/// Viewport covering `extent` with the full depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Blending disabled, all channels written, one entry per color attachment.
fn opaque_blend_attachments(count: u32) -> Vec<vk::PipelineColorBlendAttachmentState> {
    (0..count)
        .map(|_| {
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(false)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{PositionVertex, Vertex};

    #[test]
    fn test_desc_defaults() {
        let desc = GraphicsPipelineDesc::new("default");
        assert_eq!(desc.name(), "default");
        assert_eq!(desc.cull_mode, CullMode::Back);
        assert_eq!(desc.front_face, FrontFace::CounterClockwise);
        assert!(desc.depth_test_enable);
        assert!(desc.depth_write_enable);
        assert_eq!(desc.depth_compare_op, CompareOp::Less);
        assert!(desc.depth_bias.is_none());
        assert!(desc.vertex_binding.is_none());
    }

    #[test]
    fn test_vertex_layout_replaces_attributes() {
        let desc = GraphicsPipelineDesc::new("sky")
            .vertex_layout::<Vertex>()
            .vertex_layout::<PositionVertex>();
        assert_eq!(desc.vertex_attributes.len(), 1);
        assert_eq!(desc.vertex_binding.map(|b| b.stride), Some(12));
    }

    #[test]
    fn test_missing_vertex_shader_rejected() {
        let desc = GraphicsPipelineDesc::new("broken");
        assert!(matches!(desc.validate(), Err(RhiError::PipelineError(_))));
    }

    #[test]
    fn test_depth_bias_and_state_setters() {
        let desc = GraphicsPipelineDesc::new("shadow")
            .depth_bias(1.25, 1.75)
            .cull_mode(CullMode::Front)
            .depth_write_enable(false)
            .depth_compare_op(CompareOp::LessOrEqual);
        assert_eq!(
            desc.depth_bias,
            Some(DepthBias {
                constant_factor: 1.25,
                slope_factor: 1.75
            })
        );
        assert_eq!(desc.cull_mode.to_vk(), vk::CullModeFlags::FRONT);
        assert!(!desc.depth_write_enable);
        assert_eq!(desc.depth_compare_op.to_vk(), vk::CompareOp::LESS_OR_EQUAL);
    }

    #[test]
    fn test_full_viewport_matches_extent() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_blend_attachment_per_color() {
        assert!(opaque_blend_attachments(0).is_empty());
        let attachments = opaque_blend_attachments(3);
        assert_eq!(attachments.len(), 3);
        assert_eq!(attachments[2].color_write_mask, vk::ColorComponentFlags::RGBA);
        assert_eq!(attachments[2].blend_enable, vk::FALSE);
    }
}
