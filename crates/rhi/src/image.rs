//! GPU images with a bound allocation and a default view.
//!
//! [`Image`] backs render-pass attachments (G-buffer targets, depth maps,
//! the HDR lighting target) and sampled textures. The image's format and
//! sample count come from its [`ImageDesc`], which is the same value the
//! render pass uses for the matching attachment description.
//!
//! Resources are destroyed in order: view, image, allocation.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default depth format for depth attachments.
pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Number of faces in a cube image.
pub const CUBE_FACE_COUNT: u32 = 6;

/// Creation parameters for an [`Image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDesc {
    /// Debug name, also used for the allocation
    pub name: String,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    /// Array layers; six with `cube` set
    pub layers: u32,
    pub cube: bool,
}

impl ImageDesc {
    /// A single-sampled 2D image with one layer.
    pub fn new_2d(
        name: impl Into<String>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name: name.into(),
            extent,
            format,
            usage,
            samples: vk::SampleCountFlags::TYPE_1,
            layers: 1,
            cube: false,
        }
    }

    /// A cube image with six square faces.
    pub fn new_cube(
        name: impl Into<String>,
        edge: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            layers: CUBE_FACE_COUNT,
            cube: true,
            ..Self::new_2d(
                name,
                vk::Extent2D {
                    width: edge,
                    height: edge,
                },
                format,
                usage,
            )
        }
    }

    /// Returns a copy using `samples` per pixel.
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Aspect used by the default view.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.format)
    }

    fn view_type(&self) -> vk::ImageViewType {
        match (self.cube, self.layers) {
            (true, _) => vk::ImageViewType::CUBE,
            (false, 1) => vk::ImageViewType::TYPE_2D,
            (false, _) => vk::ImageViewType::TYPE_2D_ARRAY,
        }
    }

    fn validate(&self) -> RhiResult<()> {
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "image '{}' has zero extent",
                self.name
            )));
        }
        if self.cube && (self.layers != CUBE_FACE_COUNT || self.extent.width != self.extent.height)
        {
            return Err(RhiError::InvalidHandle(format!(
                "cube image '{}' needs six square layers",
                self.name
            )));
        }
        Ok(())
    }
}

/// Whether `format` has a depth component.
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// View aspect for `format`. Depth views never include stencil, so they can
/// be sampled.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    if is_depth_format(format) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// A device-local image with its memory and default view.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl Image {
    /// Creates the image, allocates device-local memory for it and creates
    /// a view covering every layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the description is invalid or any Vulkan or
    /// allocator call fails. Partially created objects are released.
    pub fn new(device: Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        desc.validate()?;

        let flags = if desc.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.layers)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        // Construct early so Drop cleans up on any later failure.
        let mut this = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: None,
            desc,
        };

        let requirements = unsafe { this.device.handle().get_image_memory_requirements(image) };
        let allocation = this.device.allocator()?.allocate(&AllocationCreateDesc {
            name: &this.desc.name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            this.device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }
        this.allocation = Some(allocation);

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(this.desc.view_type())
            .format(this.desc.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(this.desc.aspect())
                    .level_count(1)
                    .layer_count(this.desc.layers),
            );
        this.view = unsafe { this.device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created image '{}': {}x{} {:?} x{} layer(s), {:?}",
            this.desc.name,
            this.desc.extent.width,
            this.desc.extent.height,
            this.desc.format,
            this.desc.layers,
            this.desc.samples
        );

        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.desc.samples
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    /// Subresource range covering every layer of the image.
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.desc.aspect())
            .level_count(1)
            .layer_count(self.desc.layers)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        tracing::error!("Failed to free image '{}': {:?}", self.desc.name, e);
                    }
                }
                Err(e) => tracing::error!("Leaking image '{}': {}", self.desc.name, e),
            }
        }

        debug!("Destroyed image '{}'", self.desc.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_depth_formats_use_depth_aspect() {
        assert!(is_depth_format(DEFAULT_DEPTH_FORMAT));
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_view_type_follows_layers() {
        let usage = vk::ImageUsageFlags::SAMPLED;
        let flat = ImageDesc::new_2d("flat", extent(4, 4), vk::Format::R8G8B8A8_UNORM, usage);
        assert_eq!(flat.view_type(), vk::ImageViewType::TYPE_2D);

        let cube = ImageDesc::new_cube("sky", 16, vk::Format::R8G8B8A8_UNORM, usage);
        assert_eq!(cube.layers, CUBE_FACE_COUNT);
        assert_eq!(cube.view_type(), vk::ImageViewType::CUBE);

        let array = ImageDesc {
            layers: 3,
            ..flat.clone()
        };
        assert_eq!(array.view_type(), vk::ImageViewType::TYPE_2D_ARRAY);
    }

    #[test]
    fn test_validate_rejects_zero_extent() {
        let desc = ImageDesc::new_2d(
            "empty",
            extent(0, 10),
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED,
        );
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_square_cube() {
        let desc = ImageDesc {
            extent: extent(8, 4),
            ..ImageDesc::new_cube(
                "bad",
                8,
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::SAMPLED,
            )
        };
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_with_samples() {
        let desc = ImageDesc::new_2d(
            "msaa",
            extent(8, 8),
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        )
        .with_samples(vk::SampleCountFlags::TYPE_4);
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_4);
    }
}
