//! Presentable surface (swapchain) negotiation, recreation and presentation.
//!
//! Selection policy, applied by [`SwapchainConfig::negotiate`]:
//!
//! - **Format**: `B8G8R8A8_UNORM` / `SRGB_NONLINEAR` when listed, or when the
//!   surface reports a single `UNDEFINED` entry (no preference); otherwise the
//!   first supported format.
//! - **Present mode**: `MAILBOX` when offered, otherwise `FIFO`.
//! - **Extent**: the surface's `current_extent` when defined; when it holds the
//!   `u32::MAX` sentinel the requested extent is clamped into
//!   `[min_image_extent, max_image_extent]`.
//! - **Image count**: `min + 1`, clamped to `max` when `max` is non-zero.
//! - **Sharing**: `CONCURRENT` across the graphics and present families when
//!   they differ, otherwise `EXCLUSIVE`.
//!
//! Negotiation is a pure function of the reported support, so recreating with
//! the same extent twice produces the same configuration.
//!
//! Acquire and present collapse the two recoverable results
//! (`ERROR_OUT_OF_DATE_KHR`, `SUBOPTIMAL_KHR`) into [`AcquireOutcome`] and
//! [`PresentOutcome`]; every other failure is returned as an error.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Surface format chosen when the surface supports it.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// What a surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Surface support: {} formats, {} present modes, image count {}..{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Everything needed to create a swapchain, derived from surface support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing_mode: vk::SharingMode,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl SwapchainConfig {
    /// Applies the selection policy to the reported surface support.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceError`] if the surface offers no formats or
    /// no present modes.
    pub fn negotiate(
        support: &SwapchainSupportDetails,
        requested: vk::Extent2D,
        graphics_family: u32,
        present_family: u32,
    ) -> RhiResult<Self> {
        if !support.is_adequate() {
            return Err(RhiError::SurfaceError(
                "surface reports no formats or no present modes".to_string(),
            ));
        }

        let caps = &support.capabilities;
        Ok(Self {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(caps, requested),
            image_count: choose_image_count(caps),
            sharing_mode: choose_sharing_mode(graphics_family, present_family),
            pre_transform: caps.current_transform,
            composite_alpha: choose_composite_alpha(caps.supported_composite_alpha),
        })
    }
}

/// Result of acquiring a presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available; `suboptimal` images may still be rendered.
    Ready { image_index: u32, suboptimal: bool },
    /// The surface changed and the swapchain must be recreated.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the swapchain no longer matches the surface exactly.
    Suboptimal,
    /// Not presented; the swapchain must be recreated.
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swapchain should be recreated after this present.
    #[inline]
    pub fn needs_resize(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Maps the raw result of `vkAcquireNextImageKHR`.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

/// Maps the raw result of `vkQueuePresentKHR`.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

/// Vulkan swapchain wrapper.
///
/// Holds the surface handle but not the surface itself; the owner must keep
/// the surface alive for the swapchain's lifetime.
pub struct Swapchain {
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    config: SwapchainConfig,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `device` - The logical device
    /// * `surface` - The window surface
    /// * `requested` - The window's drawable size
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is unsuitable or creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        requested: vk::Extent2D,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let mut swapchain = Self {
            device,
            surface_loader,
            swapchain_loader,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            config: SwapchainConfig {
                surface_format: PREFERRED_SURFACE_FORMAT,
                present_mode: vk::PresentModeKHR::FIFO,
                extent: requested,
                image_count: 0,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            },
        };
        swapchain.build(requested)?;
        Ok(swapchain)
    }

    /// Rebuilds the swapchain for a new drawable size.
    ///
    /// The old image views are released before the new image set is
    /// acquired; the old swapchain is handed to the driver as
    /// `old_swapchain` and destroyed afterwards.
    ///
    /// # Safety contract
    ///
    /// The device must be idle and every framebuffer built on the old image
    /// views must already be destroyed.
    pub fn recreate(&mut self, requested: vk::Extent2D) -> RhiResult<()> {
        info!(
            "Recreating swapchain for {}x{}",
            requested.width, requested.height
        );
        self.destroy_image_views();
        self.build(requested)
    }

    fn build(&mut self, requested: vk::Extent2D) -> RhiResult<()> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;
        let (graphics_family, present_family) = self.device.queue_families().resolved()?;
        let config =
            SwapchainConfig::negotiate(&support, requested, graphics_family, present_family)?;

        info!(
            "Creating swapchain: {}x{}, {:?}/{:?}, {:?}, {} images, {:?}",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.image_count,
            config.sharing_mode
        );

        let family_indices = [graphics_family, present_family];
        let shared_families: &[u32] = if config.sharing_mode == vk::SharingMode::CONCURRENT {
            &family_indices
        } else {
            &[]
        };

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(config.sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(config.pre_transform)
            .composite_alpha(config.composite_alpha)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };

        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };
        self.image_views =
            create_image_views(&self.device, &self.images, config.surface_format.format)?;
        self.config = config;

        debug!("Swapchain ready with {} images", self.images.len());
        Ok(())
    }

    /// Acquires the next presentable image, signaling `semaphore` when it is
    /// ready. Blocks without timeout.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Queues `image_index` for presentation after `wait_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        classify_present(result)
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.config.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.config.extent.width,
                self.config.extent.height,
                self.images.len()
            );
        }
    }
}

/// Picks the surface format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats
        && only.format == vk::Format::UNDEFINED
    {
        return PREFERRED_SURFACE_FORMAT;
    }

    if formats.contains(&PREFERRED_SURFACE_FORMAT) {
        return PREFERRED_SURFACE_FORMAT;
    }

    match formats.first() {
        Some(&first) => {
            warn!("Preferred surface format unavailable, using {:?}", first.format);
            first
        }
        None => PREFERRED_SURFACE_FORMAT,
    }
}

/// MAILBOX when available, else FIFO (always supported).
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Picks the swapchain extent.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: requested.width.clamp(min.width, max.width),
        height: requested.height.clamp(min.height, max.height),
    }
}

/// One more image than the minimum, bounded by the maximum when it is set.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = (capabilities.min_image_count + 1).max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

pub fn choose_sharing_mode(graphics_family: u32, present_family: u32) -> vk::SharingMode {
    if graphics_family != present_family {
        vk::SharingMode::CONCURRENT
    } else {
        vk::SharingMode::EXCLUSIVE
    }
}

fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|mode| supported.contains(*mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    let mut image_views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "failed to create swapchain image view: {e}"
                )));
            }
        }
    }

    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn sentinel_caps(min: vk::Extent2D, max: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: min,
            max_image_extent: max,
            min_image_count: 2,
            max_image_count: 4,
            ..Default::default()
        }
    }

    fn support(caps: vk::SurfaceCapabilitiesKHR) -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: caps,
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                PREFERRED_SURFACE_FORMAT,
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_bgra_unorm() {
        let formats = support(Default::default()).formats;
        assert_eq!(choose_surface_format(&formats), PREFERRED_SURFACE_FORMAT);
    }

    #[test]
    fn test_choose_surface_format_undefined_means_any() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(choose_surface_format(&formats), PREFERRED_SURFACE_FORMAT);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::A2B10G10R10_UNORM_PACK32,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_keeps_request_inside_range() {
        let caps = sentinel_caps(extent(50, 50), extent(200, 200));
        assert_eq!(choose_extent(&caps, extent(100, 100)), extent(100, 100));
    }

    #[test]
    fn test_choose_extent_clamps_componentwise() {
        let caps = sentinel_caps(extent(50, 50), extent(200, 200));
        for (w, h) in [(0, 0), (10, 500), (500, 10), (u32::MAX - 1, 1), (199, 51)] {
            let chosen = choose_extent(&caps, extent(w, h));
            assert!((50..=200).contains(&chosen.width), "{w}x{h} -> {chosen:?}");
            assert!((50..=200).contains(&chosen.height), "{w}x{h} -> {chosen:?}");
        }
        assert_eq!(choose_extent(&caps, extent(10, 500)), extent(50, 200));
    }

    #[test]
    fn test_choose_extent_uses_defined_current_extent() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1920, 1080),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        assert_eq!(choose_extent(&caps, extent(800, 600)), extent(1920, 1080));
    }

    #[test]
    fn test_choose_image_count_min_plus_one() {
        let caps = sentinel_caps(extent(1, 1), extent(1, 1));
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_choose_image_count_bounds() {
        for (min, max) in [(1, 1), (2, 2), (2, 3), (3, 8), (2, 0), (1, 0)] {
            let caps = vk::SurfaceCapabilitiesKHR {
                min_image_count: min,
                max_image_count: max,
                ..Default::default()
            };
            let count = choose_image_count(&caps);
            assert!(count >= min);
            if max > 0 {
                assert!(count <= max);
            }
        }
    }

    #[test]
    fn test_sharing_mode_follows_families() {
        assert_eq!(choose_sharing_mode(0, 0), vk::SharingMode::EXCLUSIVE);
        assert_eq!(choose_sharing_mode(0, 1), vk::SharingMode::CONCURRENT);
    }

    #[test]
    fn test_negotiate_is_idempotent() {
        let details = support(sentinel_caps(extent(50, 50), extent(200, 200)));
        let first = SwapchainConfig::negotiate(&details, extent(120, 80), 0, 0).unwrap();
        let second = SwapchainConfig::negotiate(&details, first.extent, 0, 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.image_count, 3);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_negotiate_rejects_unsuitable_surface() {
        let mut details = support(sentinel_caps(extent(1, 1), extent(10, 10)));
        details.present_modes.clear();
        assert!(matches!(
            SwapchainConfig::negotiate(&details, extent(5, 5), 0, 0),
            Err(RhiError::SurfaceError(_))
        ));
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Ready {
                image_index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
        assert!(!PresentOutcome::Presented.needs_resize());
        assert!(PresentOutcome::Suboptimal.needs_resize());
    }
}
