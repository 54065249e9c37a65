//! Single-subpass render passes and their framebuffers.
//!
//! An [`AttachmentSpec`] is the one source of truth for an attachment: it
//! produces both the `VkAttachmentDescription` and the [`ImageDesc`] of the
//! image backing it, so format and sample count always agree.
//!
//! Every pass gets the same two external dependencies
//! ([`subpass_dependencies`]):
//!
//! - `EXTERNAL -> 0`: earlier shader reads and attachment writes complete
//!   before this pass writes its attachments
//! - `0 -> EXTERNAL`: this pass's attachment writes are visible to later
//!   fragment-shader reads
//!
//! Both are `BY_REGION`.
//!
//! A multisampled pass marks single-sampled attachments as resolve targets
//! ([`AttachmentSpec::resolved`]); the n-th resolve target receives the n-th
//! multisampled color attachment.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{ImageDesc, is_depth_format};

/// One attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub name: &'static str,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    /// Usage of the backing image; empty for images owned elsewhere
    pub usage: vk::ImageUsageFlags,
    /// Receives the resolved samples of a multisampled color attachment
    pub resolve: bool,
}

impl AttachmentSpec {
    /// A cleared color target that later passes sample.
    pub fn sampled_color(name: &'static str, format: vk::Format) -> Self {
        Self {
            name,
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            resolve: false,
        }
    }

    /// A cleared multisampled color target that only lives inside the pass
    /// and is resolved at its end.
    pub fn multisampled_color(
        name: &'static str,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Self {
        Self {
            samples,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            ..Self::sampled_color(name, format)
        }
    }

    /// A cleared depth target that later passes sample (shadow map).
    pub fn sampled_depth(name: &'static str, format: vk::Format) -> Self {
        Self {
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ..Self::sampled_color(name, format)
        }
    }

    /// A cleared depth buffer kept in attachment layout for a later pass
    /// to load.
    pub fn depth_buffer(name: &'static str, format: vk::Format) -> Self {
        Self {
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Self::sampled_color(name, format)
        }
    }

    /// A depth buffer written by an earlier pass, loaded for testing only.
    pub fn loaded_depth(name: &'static str, format: vk::Format) -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            usage: vk::ImageUsageFlags::empty(),
            ..Self::sampled_color(name, format)
        }
    }

    /// A swapchain image, cleared and handed to presentation.
    pub fn presented(format: vk::Format) -> Self {
        Self {
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            usage: vk::ImageUsageFlags::empty(),
            ..Self::sampled_color("swapchain", format)
        }
    }

    /// The same attachment with `samples` per pixel.
    pub fn with_samples(self, samples: vk::SampleCountFlags) -> Self {
        Self { samples, ..self }
    }

    /// The same attachment as a resolve target; its old contents are never
    /// read.
    pub fn resolved(self) -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            resolve: true,
            ..self
        }
    }

    #[inline]
    pub fn is_depth(&self) -> bool {
        is_depth_format(self.format)
    }

    pub fn description(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(self.format)
            .samples(self.samples)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(self.initial_layout)
            .final_layout(self.final_layout)
    }

    /// Description of the image backing this attachment at `extent`.
    pub fn image_desc(&self, extent: vk::Extent2D) -> ImageDesc {
        ImageDesc::new_2d(self.name, extent, self.format, self.usage).with_samples(self.samples)
    }
}

/// Stages and accesses of a subpass writing color and/or depth.
fn attachment_scope(
    has_color: bool,
    has_depth: bool,
) -> (vk::PipelineStageFlags, vk::AccessFlags, vk::AccessFlags) {
    let mut stages = vk::PipelineStageFlags::empty();
    let mut writes = vk::AccessFlags::empty();
    let mut reads = vk::AccessFlags::empty();
    if has_color {
        stages |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        writes |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        reads |= vk::AccessFlags::COLOR_ATTACHMENT_READ;
    }
    if has_depth {
        stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        writes |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        reads |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    (stages, writes, reads)
}

/// The `EXTERNAL -> 0` and `0 -> EXTERNAL` dependencies shared by every pass.
pub fn subpass_dependencies(has_color: bool, has_depth: bool) -> [vk::SubpassDependency; 2] {
    let (stages, writes, reads) = attachment_scope(has_color, has_depth);

    let input = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER | stages)
        .dst_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::SHADER_READ | writes)
        .dst_access_mask(reads | writes)
        .dependency_flags(vk::DependencyFlags::BY_REGION);

    let output = vk::SubpassDependency::default()
        .src_subpass(0)
        .dst_subpass(vk::SUBPASS_EXTERNAL)
        .src_stage_mask(stages)
        .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
        .src_access_mask(writes)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .dependency_flags(vk::DependencyFlags::BY_REGION);

    [input, output]
}

/// Attachment references of the single subpass.
#[derive(Debug)]
struct SubpassReferences {
    colors: Vec<vk::AttachmentReference>,
    resolves: Vec<vk::AttachmentReference>,
    depth: Option<vk::AttachmentReference>,
    /// Sample count shared by the color and depth attachments
    samples: vk::SampleCountFlags,
}

fn reference(index: usize, layout: vk::ImageLayout) -> vk::AttachmentReference {
    vk::AttachmentReference::default()
        .attachment(index as u32)
        .layout(layout)
}

/// Sorts `attachments` into colors, resolve targets and at most one depth
/// attachment, each in attachment order.
fn subpass_references(attachments: &[AttachmentSpec]) -> RhiResult<SubpassReferences> {
    let mut refs = SubpassReferences {
        colors: Vec::new(),
        resolves: Vec::new(),
        depth: None,
        samples: vk::SampleCountFlags::TYPE_1,
    };
    let mut samples = None;
    for (index, spec) in attachments.iter().enumerate() {
        if spec.resolve {
            if spec.samples != vk::SampleCountFlags::TYPE_1 {
                return Err(RhiError::RenderPassError(format!(
                    "resolve target '{}' must be single-sampled",
                    spec.name
                )));
            }
            refs.resolves.push(reference(index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
            continue;
        }

        match samples {
            None => samples = Some(spec.samples),
            Some(samples) if samples != spec.samples => {
                return Err(RhiError::RenderPassError(format!(
                    "'{}' has {:?} samples, other attachments {:?}",
                    spec.name, spec.samples, samples
                )));
            }
            Some(_) => {}
        }

        if spec.is_depth() {
            if refs.depth.is_some() {
                return Err(RhiError::RenderPassError(format!(
                    "'{}' is a second depth attachment",
                    spec.name
                )));
            }
            refs.depth = Some(reference(index, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
        } else {
            refs.colors.push(reference(index, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        }
    }

    if !refs.resolves.is_empty() && refs.resolves.len() != refs.colors.len() {
        return Err(RhiError::RenderPassError(format!(
            "{} resolve target(s) for {} color attachment(s)",
            refs.resolves.len(),
            refs.colors.len()
        )));
    }
    if let Some(samples) = samples {
        refs.samples = samples;
    }
    Ok(refs)
}

/// An owned `VkRenderPass` with one graphics subpass.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    color_count: u32,
    samples: vk::SampleCountFlags,
}

impl RenderPass {
    /// Creates a render pass over `attachments`, in framebuffer order.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::RenderPassError`] for an empty list, more than
    /// one depth attachment, mixed sample counts or unpaired resolve
    /// targets, or the Vulkan error.
    pub fn new(
        device: Arc<Device>,
        name: &str,
        attachments: &[AttachmentSpec],
    ) -> RhiResult<Self> {
        if attachments.is_empty() {
            return Err(RhiError::RenderPassError(format!(
                "render pass '{}' has no attachments",
                name
            )));
        }

        let descriptions: Vec<_> = attachments
            .iter()
            .map(AttachmentSpec::description)
            .collect();
        let refs = subpass_references(attachments)?;

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&refs.colors);
        if !refs.resolves.is_empty() {
            subpass = subpass.resolve_attachments(&refs.resolves);
        }
        if let Some(depth) = refs.depth.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth);
        }
        let subpasses = [subpass];
        let dependencies = subpass_dependencies(!refs.colors.is_empty(), refs.depth.is_some());

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&descriptions)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
        debug!(
            "Created render pass '{}' ({} color, {} resolve, depth: {}, samples {:?})",
            name,
            refs.colors.len(),
            refs.resolves.len(),
            refs.depth.is_some(),
            refs.samples
        );

        Ok(Self {
            device,
            render_pass,
            color_count: refs.colors.len() as u32,
            samples: refs.samples,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Number of color attachments, which pipelines need for blend state.
    #[inline]
    pub fn color_count(&self) -> u32 {
        self.color_count
    }

    /// Samples per pixel every pipeline of this pass rasterizes with.
    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_render_pass(self.render_pass, None) };
    }
}

/// An owned `VkFramebuffer`.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
        Ok(Self {
            device,
            framebuffer,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_framebuffer(self.framebuffer, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 640,
        height: 480,
    };

    #[test]
    fn test_description_matches_backing_image() {
        let specs = [
            AttachmentSpec::sampled_color("position", vk::Format::R16G16B16A16_SFLOAT),
            AttachmentSpec::sampled_color("albedo", vk::Format::R8G8B8A8_UNORM),
            AttachmentSpec::sampled_depth("shadow", vk::Format::D32_SFLOAT),
            AttachmentSpec::depth_buffer("depth", vk::Format::D32_SFLOAT),
        ];
        for spec in specs {
            let description = spec.description();
            let image = spec.image_desc(EXTENT);
            assert_eq!(description.format, image.format);
            assert_eq!(description.samples, image.samples);
        }
    }

    #[test]
    fn test_presented_attachment_layouts() {
        let spec = AttachmentSpec::presented(vk::Format::B8G8R8A8_UNORM);
        assert_eq!(spec.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(spec.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_loaded_depth_keeps_contents() {
        let spec = AttachmentSpec::loaded_depth("depth", vk::Format::D32_SFLOAT);
        assert_eq!(spec.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(spec.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            spec.initial_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(spec.final_layout, spec.initial_layout);
        assert!(spec.is_depth());
    }

    #[test]
    fn test_dependencies_are_external_and_by_region() {
        let [input, output] = subpass_dependencies(true, false);
        assert_eq!(input.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(input.dst_subpass, 0);
        assert_eq!(output.src_subpass, 0);
        assert_eq!(output.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(input.dependency_flags, vk::DependencyFlags::BY_REGION);
        assert_eq!(output.dependency_flags, vk::DependencyFlags::BY_REGION);

        assert_eq!(input.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(input.src_access_mask.contains(vk::AccessFlags::SHADER_READ));
        assert_eq!(output.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(output.dst_access_mask, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_depth_only_dependencies_use_fragment_tests() {
        let [input, output] = subpass_dependencies(false, true);
        let tests = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        assert_eq!(input.dst_stage_mask, tests);
        assert_eq!(output.src_stage_mask, tests);
        assert_eq!(output.src_access_mask, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE);
        assert!(
            !output
                .src_stage_mask
                .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        );
    }

    #[test]
    fn test_subpass_references_split_color_and_depth() {
        let specs = [
            AttachmentSpec::sampled_color("a", vk::Format::R8G8B8A8_UNORM),
            AttachmentSpec::depth_buffer("depth", vk::Format::D32_SFLOAT),
            AttachmentSpec::sampled_color("b", vk::Format::R8G8B8A8_UNORM),
        ];
        let refs = subpass_references(&specs).unwrap();
        assert_eq!(
            refs.colors.iter().map(|r| r.attachment).collect::<Vec<_>>(),
            [0, 2]
        );
        assert_eq!(refs.depth.map(|r| r.attachment), Some(1));
        assert!(refs.resolves.is_empty());
        assert_eq!(refs.samples, vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn test_multisampled_colors_pair_with_resolve_targets() {
        let samples = vk::SampleCountFlags::TYPE_4;
        let specs = [
            AttachmentSpec::multisampled_color("a", vk::Format::R8G8B8A8_UNORM, samples),
            AttachmentSpec::multisampled_color("b", vk::Format::R8G8B8A8_UNORM, samples),
            AttachmentSpec::depth_buffer("depth", vk::Format::D32_SFLOAT).with_samples(samples),
            AttachmentSpec::sampled_color("a_resolved", vk::Format::R8G8B8A8_UNORM).resolved(),
            AttachmentSpec::sampled_color("b_resolved", vk::Format::R8G8B8A8_UNORM).resolved(),
        ];
        let refs = subpass_references(&specs).unwrap();
        assert_eq!(
            refs.colors.iter().map(|r| r.attachment).collect::<Vec<_>>(),
            [0, 1]
        );
        assert_eq!(
            refs.resolves.iter().map(|r| r.attachment).collect::<Vec<_>>(),
            [3, 4]
        );
        assert_eq!(refs.depth.map(|r| r.attachment), Some(2));
        assert_eq!(refs.samples, samples);
    }

    #[test]
    fn test_mixed_sample_counts_rejected() {
        let specs = [
            AttachmentSpec::multisampled_color(
                "color",
                vk::Format::R8G8B8A8_UNORM,
                vk::SampleCountFlags::TYPE_4,
            ),
            AttachmentSpec::depth_buffer("depth", vk::Format::D32_SFLOAT),
        ];
        assert!(matches!(
            subpass_references(&specs),
            Err(RhiError::RenderPassError(_))
        ));
    }

    #[test]
    fn test_unpaired_resolve_target_rejected() {
        let samples = vk::SampleCountFlags::TYPE_2;
        let specs = [
            AttachmentSpec::multisampled_color("a", vk::Format::R8G8B8A8_UNORM, samples),
            AttachmentSpec::multisampled_color("b", vk::Format::R8G8B8A8_UNORM, samples),
            AttachmentSpec::presented(vk::Format::B8G8R8A8_UNORM).resolved(),
        ];
        assert!(subpass_references(&specs).is_err());

        let multisampled_target = [
            AttachmentSpec::multisampled_color("a", vk::Format::R8G8B8A8_UNORM, samples),
            AttachmentSpec::sampled_color("a_resolved", vk::Format::R8G8B8A8_UNORM)
                .with_samples(samples)
                .resolved(),
        ];
        assert!(subpass_references(&multisampled_target).is_err());
    }

    #[test]
    fn test_resolved_target_discards_old_contents() {
        let spec = AttachmentSpec::presented(vk::Format::B8G8R8A8_UNORM).resolved();
        assert!(spec.resolve);
        assert_eq!(spec.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(spec.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(spec.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let transient = AttachmentSpec::multisampled_color(
            "msaa",
            vk::Format::B8G8R8A8_UNORM,
            vk::SampleCountFlags::TYPE_4,
        );
        assert_eq!(transient.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert!(transient.usage.contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT));
        assert!(!transient.usage.contains(vk::ImageUsageFlags::SAMPLED));
    }

    #[test]
    fn test_two_depth_attachments_rejected() {
        let specs = [
            AttachmentSpec::depth_buffer("one", vk::Format::D32_SFLOAT),
            AttachmentSpec::depth_buffer("two", vk::Format::D32_SFLOAT),
        ];
        assert!(matches!(
            subpass_references(&specs),
            Err(RhiError::RenderPassError(_))
        ));
    }
}
