//! The deferred render-pass graph.
//!
//! Four passes run in a fixed order every frame:
//!
//! 1. [`PassKind::Depth`] renders the shadow map from the light at a fixed
//!    resolution.
//! 2. [`PassKind::Geometry`] fills the G-buffer (position, normal, albedo)
//!    and a depth buffer.
//! 3. [`PassKind::Lighting`] samples the G-buffer and shadow map into an HDR
//!    target.
//! 4. [`PassKind::Final`] samples the HDR target onto each swapchain image,
//!    loading the geometry depth so depth-tested draws (the skybox) still
//!    work.
//!
//! With more than one sample per pixel, Geometry renders into transient
//! multisampled targets resolved into the sampled G-buffer, and Final
//! renders into a transient multisampled color resolved into the swapchain
//! image. Both share the multisampled geometry depth. Depth and Lighting
//! always use one sample.
//!
//! Every pass is a [`GraphPass`] running the same lifecycle: create the
//! attachment images, create the render pass, create the framebuffers. The
//! attachment description and the backing image both come from one
//! [`AttachmentSpec`], so their format and sample count always agree.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use deferred_rhi::device::Device;
use deferred_rhi::image::{DEFAULT_DEPTH_FORMAT, Image};
use deferred_rhi::render_pass::{AttachmentSpec, Framebuffer, RenderPass};
use deferred_rhi::swapchain::Swapchain;
use deferred_rhi::{RhiError, RhiResult};

/// G-buffer world-space position.
pub const GBUFFER_POSITION_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
/// G-buffer world-space normal.
pub const GBUFFER_NORMAL_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
/// G-buffer surface color.
pub const GBUFFER_ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// Output of the lighting pass.
pub const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Name of the geometry depth attachment, which the final pass loads.
const GEOMETRY_DEPTH: &str = "gbuffer_depth";

/// G-buffer targets: sampled name, multisampled name, format.
const GBUFFER_TARGETS: [(&str, &str, vk::Format); 3] = [
    ("gbuffer_position", "gbuffer_position_msaa", GBUFFER_POSITION_FORMAT),
    ("gbuffer_normal", "gbuffer_normal_msaa", GBUFFER_NORMAL_FORMAT),
    ("gbuffer_albedo", "gbuffer_albedo_msaa", GBUFFER_ALBEDO_FORMAT),
];

fn has_multiple_samples(samples: vk::SampleCountFlags) -> bool {
    samples != vk::SampleCountFlags::TYPE_1
}

/// The passes of the graph, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Depth,
    Geometry,
    Lighting,
    Final,
}

impl PassKind {
    /// Every pass in execution order.
    pub const ALL: [PassKind; 4] = [
        PassKind::Depth,
        PassKind::Geometry,
        PassKind::Lighting,
        PassKind::Final,
    ];

    /// Passes recreated on resize, in recreation order.
    pub const SWAPCHAIN_SIZED: [PassKind; 3] =
        [PassKind::Geometry, PassKind::Lighting, PassKind::Final];

    /// Order in which resize releases the swapchain-sized passes: every pass
    /// before the ones it borrows from.
    pub const RELEASE_ORDER: [PassKind; 3] =
        [PassKind::Final, PassKind::Lighting, PassKind::Geometry];

    pub fn name(self) -> &'static str {
        match self {
            PassKind::Depth => "depth",
            PassKind::Geometry => "geometry",
            PassKind::Lighting => "lighting",
            PassKind::Final => "final",
        }
    }

    /// Whether the pass follows the swapchain extent.
    pub fn is_swapchain_sized(self) -> bool {
        !matches!(self, PassKind::Depth)
    }

    /// Whether the pass renders with the configured sample count.
    pub fn is_multisampled(self) -> bool {
        matches!(self, PassKind::Geometry | PassKind::Final)
    }

    /// Attachments of this pass, in framebuffer order, for `samples` per
    /// pixel.
    pub fn attachment_specs(
        self,
        swapchain_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Vec<AttachmentSpec> {
        let msaa = self.is_multisampled() && has_multiple_samples(samples);
        match self {
            PassKind::Depth => vec![AttachmentSpec::sampled_depth(
                "shadow_map",
                DEFAULT_DEPTH_FORMAT,
            )],
            PassKind::Geometry if msaa => {
                let mut specs: Vec<_> = GBUFFER_TARGETS
                    .iter()
                    .map(|&(_, name, format)| {
                        AttachmentSpec::multisampled_color(name, format, samples)
                    })
                    .collect();
                specs.push(
                    AttachmentSpec::depth_buffer(GEOMETRY_DEPTH, DEFAULT_DEPTH_FORMAT)
                        .with_samples(samples),
                );
                specs.extend(GBUFFER_TARGETS.iter().map(|&(name, _, format)| {
                    AttachmentSpec::sampled_color(name, format).resolved()
                }));
                specs
            }
            PassKind::Geometry => {
                let mut specs: Vec<_> = GBUFFER_TARGETS
                    .iter()
                    .map(|&(name, _, format)| AttachmentSpec::sampled_color(name, format))
                    .collect();
                specs.push(AttachmentSpec::depth_buffer(
                    GEOMETRY_DEPTH,
                    DEFAULT_DEPTH_FORMAT,
                ));
                specs
            }
            PassKind::Lighting => vec![AttachmentSpec::sampled_color("hdr", HDR_FORMAT)],
            PassKind::Final if msaa => vec![
                AttachmentSpec::multisampled_color("final_msaa", swapchain_format, samples),
                AttachmentSpec::loaded_depth(GEOMETRY_DEPTH, DEFAULT_DEPTH_FORMAT)
                    .with_samples(samples),
                AttachmentSpec::presented(swapchain_format).resolved(),
            ],
            PassKind::Final => vec![
                AttachmentSpec::presented(swapchain_format),
                AttachmentSpec::loaded_depth(GEOMETRY_DEPTH, DEFAULT_DEPTH_FORMAT),
            ],
        }
    }

    /// Clear values for `specs`, one per attachment so indices line up.
    ///
    /// `final_color` clears the final pass's color; entries for loaded and
    /// resolve attachments are ignored by Vulkan.
    pub fn clear_values(
        self,
        specs: &[AttachmentSpec],
        final_color: [f32; 4],
    ) -> Vec<vk::ClearValue> {
        let color = match self {
            PassKind::Final => final_color,
            PassKind::Lighting => [0.0, 0.0, 0.0, 1.0],
            PassKind::Depth | PassKind::Geometry => [0.0; 4],
        };
        specs
            .iter()
            .map(|spec| {
                if spec.is_depth() {
                    vk::ClearValue {
                        depth_stencil: vk::ClearDepthStencilValue {
                            depth: 1.0,
                            stencil: 0,
                        },
                    }
                } else {
                    vk::ClearValue {
                        color: vk::ClearColorValue { float32: color },
                    }
                }
            })
            .collect()
    }
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether the pass owns the image behind `spec`.
///
/// Swapchain images and loaded depth belong to someone else and are
/// created with empty usage.
fn is_owned(spec: &AttachmentSpec) -> bool {
    !spec.usage.is_empty()
}

fn is_presented(spec: &AttachmentSpec) -> bool {
    spec.final_layout == vk::ImageLayout::PRESENT_SRC_KHR
}

/// Views a pass borrows instead of owning.
#[derive(Debug, Clone, Copy, Default)]
pub struct BorrowedViews<'a> {
    /// One view per swapchain image
    pub swapchain: &'a [vk::ImageView],
    /// Depth written by an earlier pass
    pub depth: Option<vk::ImageView>,
}

/// Attachment views for each framebuffer of a pass.
///
/// A pass with a presented attachment gets one framebuffer per swapchain
/// image; any other pass gets exactly one.
///
/// # Errors
///
/// Returns [`RhiError::RenderPassError`] if a borrowed view is missing or
/// the owned views do not match the specs.
pub fn framebuffer_views(
    pass: &str,
    specs: &[AttachmentSpec],
    owned: &[vk::ImageView],
    borrowed: BorrowedViews<'_>,
) -> RhiResult<Vec<Vec<vk::ImageView>>> {
    let presents = specs.iter().any(is_presented);
    let count = if presents { borrowed.swapchain.len() } else { 1 };
    if count == 0 {
        return Err(RhiError::RenderPassError(format!(
            "pass '{}' presents but has no swapchain views",
            pass
        )));
    }

    let mut framebuffers = Vec::with_capacity(count);
    for index in 0..count {
        let mut owned_views = owned.iter();
        let mut views = Vec::with_capacity(specs.len());
        for spec in specs {
            let view = if is_presented(spec) {
                Some(borrowed.swapchain[index])
            } else if is_owned(spec) {
                owned_views.next().copied()
            } else {
                borrowed.depth
            };
            views.push(view.ok_or_else(|| {
                RhiError::RenderPassError(format!(
                    "pass '{}' has no view for attachment '{}'",
                    pass, spec.name
                ))
            })?);
        }
        if owned_views.next().is_some() {
            return Err(RhiError::RenderPassError(format!(
                "pass '{}' was given more owned views than attachments",
                pass
            )));
        }
        framebuffers.push(views);
    }
    Ok(framebuffers)
}

/// One pass of the graph with its attachments and framebuffers.
pub struct GraphPass {
    kind: PassKind,
    device: Arc<Device>,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    specs: Vec<AttachmentSpec>,
    // Declared before the render pass and images they reference.
    framebuffers: Vec<Framebuffer>,
    render_pass: Option<RenderPass>,
    attachments: Vec<Image>,
}

impl GraphPass {
    /// An empty pass; nothing is created until the lifecycle runs.
    pub fn new(
        device: Arc<Device>,
        kind: PassKind,
        extent: vk::Extent2D,
        swapchain_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Self {
        Self {
            kind,
            device,
            extent,
            samples,
            specs: kind.attachment_specs(swapchain_format, samples),
            framebuffers: Vec::new(),
            render_pass: None,
            attachments: Vec::new(),
        }
    }

    /// Creates the images this pass owns at the current extent.
    pub fn create_attachments(&mut self) -> RhiResult<()> {
        self.attachments = self
            .specs
            .iter()
            .filter(|spec| is_owned(spec))
            .map(|spec| Image::new(self.device.clone(), spec.image_desc(self.extent)))
            .collect::<RhiResult<Vec<_>>>()?;
        Ok(())
    }

    /// Creates the render pass from the attachment specs.
    pub fn create_pass_descriptor(&mut self) -> RhiResult<()> {
        self.render_pass = Some(RenderPass::new(
            self.device.clone(),
            self.kind.name(),
            &self.specs,
        )?);
        Ok(())
    }

    /// Creates the framebuffers over owned and borrowed views.
    pub fn create_framebuffers(&mut self, borrowed: BorrowedViews<'_>) -> RhiResult<()> {
        let owned: Vec<_> = self.attachments.iter().map(Image::view).collect();
        let views = framebuffer_views(self.kind.name(), &self.specs, &owned, borrowed)?;
        let render_pass = self.render_pass()?;
        let framebuffers = views
            .iter()
            .map(|views| Framebuffer::new(self.device.clone(), render_pass, views, self.extent))
            .collect::<RhiResult<Vec<_>>>()?;
        self.framebuffers = framebuffers;
        Ok(())
    }

    /// Runs the full lifecycle.
    pub fn create(&mut self, borrowed: BorrowedViews<'_>) -> RhiResult<()> {
        self.create_attachments()?;
        self.create_pass_descriptor()?;
        self.create_framebuffers(borrowed)?;
        debug!(
            "Created {} pass at {}x{} ({} framebuffer(s))",
            self.kind,
            self.extent.width,
            self.extent.height,
            self.framebuffers.len()
        );
        Ok(())
    }

    /// Destroys framebuffers, render pass and images, in that order.
    ///
    /// The GPU must be idle.
    pub fn release(&mut self) {
        self.framebuffers.clear();
        self.render_pass = None;
        self.attachments.clear();
    }

    /// Releases and rebuilds the pass at `extent`.
    pub fn recreate(
        &mut self,
        extent: vk::Extent2D,
        swapchain_format: vk::Format,
        borrowed: BorrowedViews<'_>,
    ) -> RhiResult<()> {
        self.release();
        self.extent = extent;
        self.specs = self.kind.attachment_specs(swapchain_format, self.samples);
        self.create(borrowed)
    }

    #[inline]
    pub fn kind(&self) -> PassKind {
        self.kind
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn specs(&self) -> &[AttachmentSpec] {
        &self.specs
    }

    /// Clear values for this pass's attachments.
    pub fn clear_values(&self, final_color: [f32; 4]) -> Vec<vk::ClearValue> {
        self.kind.clear_values(&self.specs, final_color)
    }

    /// The render pass, or an error if the pass is released.
    pub fn render_pass(&self) -> RhiResult<&RenderPass> {
        self.render_pass.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle(format!("{} pass has no render pass", self.kind))
        })
    }

    /// Framebuffer `index`; the final pass has one per swapchain image.
    pub fn framebuffer(&self, index: usize) -> RhiResult<vk::Framebuffer> {
        self.framebuffers
            .get(index)
            .map(Framebuffer::handle)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "{} pass has no framebuffer {} ({} created)",
                    self.kind,
                    index,
                    self.framebuffers.len()
                ))
            })
    }

    /// Owned attachment images, in attachment order.
    pub fn attachments(&self) -> &[Image] {
        &self.attachments
    }

    /// Views of the owned color attachments later passes sample.
    pub fn color_views(&self) -> Vec<vk::ImageView> {
        self.attachments
            .iter()
            .filter(|image| {
                let desc = image.desc();
                desc.usage.contains(vk::ImageUsageFlags::SAMPLED)
                    && !desc.aspect().contains(vk::ImageAspectFlags::DEPTH)
            })
            .map(Image::view)
            .collect()
    }

    /// View of the owned depth attachment.
    pub fn depth_view(&self) -> Option<vk::ImageView> {
        self.attachments
            .iter()
            .find(|image| image.desc().aspect().contains(vk::ImageAspectFlags::DEPTH))
            .map(Image::view)
    }
}

/// The four passes of the deferred pipeline.
pub struct RenderGraph {
    // Final borrows the geometry depth view and goes first.
    final_pass: GraphPass,
    lighting: GraphPass,
    geometry: GraphPass,
    depth: GraphPass,
}

impl RenderGraph {
    /// Creates every pass: the depth pass at `shadow_map_size` squared, the
    /// others at the swapchain extent. Geometry and Final render with
    /// `samples` per pixel.
    ///
    /// # Errors
    ///
    /// Returns an error if any image, render pass or framebuffer cannot be
    /// created.
    pub fn new(
        device: Arc<Device>,
        shadow_map_size: u32,
        samples: vk::SampleCountFlags,
        swapchain: &Swapchain,
    ) -> RhiResult<Self> {
        let format = swapchain.format();
        let extent = swapchain.extent();
        let shadow_extent = vk::Extent2D {
            width: shadow_map_size,
            height: shadow_map_size,
        };
        let pass = |kind: PassKind, extent| {
            let samples = if kind.is_multisampled() {
                samples
            } else {
                vk::SampleCountFlags::TYPE_1
            };
            GraphPass::new(device.clone(), kind, extent, format, samples)
        };

        let mut graph = Self {
            final_pass: pass(PassKind::Final, extent),
            lighting: pass(PassKind::Lighting, extent),
            geometry: pass(PassKind::Geometry, extent),
            depth: pass(PassKind::Depth, shadow_extent),
        };
        for kind in PassKind::ALL {
            let borrowed = graph.borrowed_views(kind, swapchain);
            graph.pass_mut(kind).create(borrowed)?;
        }

        info!(
            "Render graph ready: shadow map {}x{}, targets {}x{}, {:?} samples",
            shadow_map_size, shadow_map_size, extent.width, extent.height, samples
        );
        Ok(graph)
    }

    pub fn pass(&self, kind: PassKind) -> &GraphPass {
        match kind {
            PassKind::Depth => &self.depth,
            PassKind::Geometry => &self.geometry,
            PassKind::Lighting => &self.lighting,
            PassKind::Final => &self.final_pass,
        }
    }

    fn pass_mut(&mut self, kind: PassKind) -> &mut GraphPass {
        match kind {
            PassKind::Depth => &mut self.depth,
            PassKind::Geometry => &mut self.geometry,
            PassKind::Lighting => &mut self.lighting,
            PassKind::Final => &mut self.final_pass,
        }
    }

    /// Views `kind` borrows: Final presents and loads the geometry depth.
    fn borrowed_views<'a>(&self, kind: PassKind, swapchain: &'a Swapchain) -> BorrowedViews<'a> {
        match kind {
            PassKind::Final => BorrowedViews {
                swapchain: swapchain.image_views(),
                depth: self.geometry.depth_view(),
            },
            PassKind::Depth | PassKind::Geometry | PassKind::Lighting => {
                BorrowedViews::default()
            }
        }
    }

    /// Releases the swapchain-sized passes in [`PassKind::RELEASE_ORDER`].
    pub fn release_swapchain_sized(&mut self) {
        for kind in PassKind::RELEASE_ORDER {
            self.pass_mut(kind).release();
        }
    }

    /// Rebuilds the swapchain-sized passes for the current swapchain, in
    /// [`PassKind::SWAPCHAIN_SIZED`] order. The depth pass is untouched.
    pub fn recreate_swapchain_sized(&mut self, swapchain: &Swapchain) -> RhiResult<()> {
        let format = swapchain.format();
        let extent = swapchain.extent();
        for kind in PassKind::SWAPCHAIN_SIZED {
            let borrowed = self.borrowed_views(kind, swapchain);
            self.pass_mut(kind).recreate(extent, format, borrowed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    const ONE: vk::SampleCountFlags = vk::SampleCountFlags::TYPE_1;
    const FOUR: vk::SampleCountFlags = vk::SampleCountFlags::TYPE_4;
    const UNORM: vk::Format = vk::Format::B8G8R8A8_UNORM;

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    fn sampled_names(specs: &[AttachmentSpec]) -> Vec<&'static str> {
        specs
            .iter()
            .filter(|spec| spec.usage.contains(vk::ImageUsageFlags::SAMPLED))
            .map(|spec| spec.name)
            .collect()
    }

    #[test]
    fn test_only_depth_is_fixed_size() {
        assert!(!PassKind::Depth.is_swapchain_sized());
        for kind in PassKind::SWAPCHAIN_SIZED {
            assert!(kind.is_swapchain_sized());
        }
    }

    #[test]
    fn test_resize_releases_borrowers_first_and_recreates_in_reverse() {
        assert_eq!(
            PassKind::RELEASE_ORDER,
            [PassKind::Final, PassKind::Lighting, PassKind::Geometry]
        );
        assert_eq!(
            PassKind::SWAPCHAIN_SIZED,
            [PassKind::Geometry, PassKind::Lighting, PassKind::Final]
        );
        let mut reversed = PassKind::RELEASE_ORDER;
        reversed.reverse();
        assert_eq!(reversed, PassKind::SWAPCHAIN_SIZED);
        assert!(!PassKind::RELEASE_ORDER.contains(&PassKind::Depth));
        assert!(!PassKind::SWAPCHAIN_SIZED.contains(&PassKind::Depth));
    }

    #[test]
    fn test_recreated_passes_follow_execution_order() {
        let position = |kind: PassKind| PassKind::ALL.iter().position(|&k| k == kind);
        let order: Vec<_> = PassKind::SWAPCHAIN_SIZED.map(position).into_iter().collect();
        assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_specs_are_stable_across_resizes() {
        for samples in [ONE, FOUR] {
            for kind in PassKind::SWAPCHAIN_SIZED {
                let before = kind.attachment_specs(UNORM, samples);
                let after = kind.attachment_specs(UNORM, samples);
                assert_eq!(before, after, "{}", kind);
            }
        }

        // A new swapchain format only reaches the swapchain-bound attachments.
        let srgb = vk::Format::B8G8R8A8_SRGB;
        for kind in [PassKind::Depth, PassKind::Geometry, PassKind::Lighting] {
            assert_eq!(
                kind.attachment_specs(UNORM, FOUR),
                kind.attachment_specs(srgb, FOUR)
            );
        }
        let finals = PassKind::Final.attachment_specs(srgb, FOUR);
        assert!(finals.iter().filter(|spec| !spec.is_depth()).all(|spec| spec.format == srgb));
    }

    #[test]
    fn test_geometry_has_three_colors_and_depth() {
        let specs = PassKind::Geometry.attachment_specs(UNORM, ONE);
        let colors = specs.iter().filter(|spec| !spec.is_depth()).count();
        let depths = specs.iter().filter(|spec| spec.is_depth()).count();
        assert_eq!(colors, 3);
        assert_eq!(depths, 1);
        assert_eq!(
            specs[3].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_multisampled_geometry_resolves_into_sampled_gbuffer() {
        let single = PassKind::Geometry.attachment_specs(UNORM, ONE);
        let specs = PassKind::Geometry.attachment_specs(UNORM, FOUR);
        assert_eq!(specs.len(), 7);
        assert!(specs[..4].iter().all(|spec| spec.samples == FOUR && !spec.resolve));
        assert!(specs[4..].iter().all(|spec| spec.samples == ONE && spec.resolve));

        // Lighting samples the same three targets either way.
        assert_eq!(sampled_names(&specs), sampled_names(&single));
        assert_eq!(
            sampled_names(&specs),
            ["gbuffer_position", "gbuffer_normal", "gbuffer_albedo"]
        );
        for (target, resolved) in specs[..3].iter().zip(&specs[4..]) {
            assert_eq!(target.format, resolved.format);
            assert_eq!(resolved.final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        }
    }

    #[test]
    fn test_multisampled_final_resolves_into_swapchain() {
        let specs = PassKind::Final.attachment_specs(UNORM, FOUR);
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].samples, FOUR);
        assert_eq!(specs[1].samples, FOUR);
        assert_eq!(specs[1].load_op, vk::AttachmentLoadOp::LOAD);
        assert!(specs[2].resolve);
        assert_eq!(specs[2].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        // Final loads exactly what Geometry stored.
        let geometry = PassKind::Geometry.attachment_specs(UNORM, FOUR);
        let depth = geometry.iter().find(|spec| spec.is_depth()).unwrap();
        assert_eq!(specs[1].samples, depth.samples);
        assert_eq!(specs[1].initial_layout, depth.final_layout);
    }

    #[test]
    fn test_depth_and_lighting_ignore_sample_count() {
        for kind in [PassKind::Depth, PassKind::Lighting] {
            assert!(!kind.is_multisampled());
            assert_eq!(kind.attachment_specs(UNORM, FOUR), kind.attachment_specs(UNORM, ONE));
        }
    }

    #[test]
    fn test_attachment_descriptions_match_backing_images() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        for samples in [ONE, FOUR] {
            for kind in PassKind::ALL {
                for spec in kind.attachment_specs(UNORM, samples) {
                    let description = spec.description();
                    let image = spec.image_desc(extent);
                    assert_eq!(description.format, image.format, "{} {}", kind, spec.name);
                    assert_eq!(description.samples, image.samples, "{} {}", kind, spec.name);
                }
            }
        }
    }

    #[test]
    fn test_final_presents_and_loads_geometry_depth() {
        let srgb = vk::Format::B8G8R8A8_SRGB;
        let specs = PassKind::Final.attachment_specs(srgb, ONE);
        assert_eq!(specs[0].format, srgb);
        assert_eq!(specs[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(specs[1].load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(specs[1].store_op, vk::AttachmentStoreOp::DONT_CARE);

        let geometry = PassKind::Geometry.attachment_specs(srgb, ONE);
        assert_eq!(specs[1].format, geometry[3].format);
        assert_eq!(specs[1].initial_layout, geometry[3].final_layout);
    }

    #[test]
    fn test_sampled_outputs_end_shader_readable() {
        for kind in [PassKind::Depth, PassKind::Lighting] {
            for spec in kind.attachment_specs(UNORM, ONE) {
                assert_eq!(
                    spec.final_layout,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                );
            }
        }
    }

    #[test]
    fn test_clear_values_cover_every_attachment() {
        for samples in [ONE, FOUR] {
            for kind in PassKind::ALL {
                let specs = kind.attachment_specs(UNORM, samples);
                assert_eq!(
                    kind.clear_values(&specs, [0.1, 0.2, 0.3, 1.0]).len(),
                    specs.len()
                );
            }
        }
    }

    #[test]
    fn test_final_clears_with_configured_color() {
        let specs = PassKind::Final.attachment_specs(UNORM, FOUR);
        let values = PassKind::Final.clear_values(&specs, [0.1, 0.2, 0.3, 1.0]);
        let color = unsafe { values[0].color.float32 };
        assert_eq!(color, [0.1, 0.2, 0.3, 1.0]);
        let depth = unsafe { values[1].depth_stencil.depth };
        assert_eq!(depth, 1.0);

        let specs = PassKind::Lighting.attachment_specs(UNORM, ONE);
        let lighting = PassKind::Lighting.clear_values(&specs, [0.5; 4]);
        let color = unsafe { lighting[0].color.float32 };
        assert_eq!(color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_offscreen_pass_has_one_framebuffer() {
        let specs = PassKind::Geometry.attachment_specs(UNORM, ONE);
        let owned = [view(1), view(2), view(3), view(4)];
        let views =
            framebuffer_views("geometry", &specs, &owned, BorrowedViews::default()).unwrap();
        assert_eq!(views, vec![owned.to_vec()]);
    }

    #[test]
    fn test_final_has_one_framebuffer_per_swap_image() {
        let specs = PassKind::Final.attachment_specs(UNORM, ONE);
        let swapchain = [view(10), view(11), view(12)];
        let borrowed = BorrowedViews {
            swapchain: &swapchain,
            depth: Some(view(99)),
        };
        let views = framebuffer_views("final", &specs, &[], borrowed).unwrap();
        assert_eq!(views.len(), 3);
        for (index, framebuffer) in views.iter().enumerate() {
            assert_eq!(framebuffer, &vec![swapchain[index], view(99)]);
        }
    }

    #[test]
    fn test_multisampled_final_shares_its_color_target() {
        let specs = PassKind::Final.attachment_specs(UNORM, FOUR);
        let swapchain = [view(10), view(11)];
        let borrowed = BorrowedViews {
            swapchain: &swapchain,
            depth: Some(view(99)),
        };
        let views = framebuffer_views("final", &specs, &[view(5)], borrowed).unwrap();
        assert_eq!(
            views,
            vec![
                vec![view(5), view(99), view(10)],
                vec![view(5), view(99), view(11)],
            ]
        );
    }

    #[test]
    fn test_missing_borrowed_depth_is_rejected() {
        let specs = PassKind::Final.attachment_specs(UNORM, ONE);
        let swapchain = [view(10)];
        let borrowed = BorrowedViews {
            swapchain: &swapchain,
            depth: None,
        };
        let result = framebuffer_views("final", &specs, &[], borrowed);
        assert!(matches!(result, Err(RhiError::RenderPassError(_))));
    }

    #[test]
    fn test_extra_owned_views_are_rejected() {
        let specs = PassKind::Lighting.attachment_specs(UNORM, ONE);
        let result = framebuffer_views(
            "lighting",
            &specs,
            &[view(1), view(2)],
            BorrowedViews::default(),
        );
        assert!(result.is_err());
    }
}
