//! Sampled textures uploaded from CPU pixel data.
//!
//! Pixels are RGBA8, tightly packed, one slice per array layer. Upload goes
//! through a staging buffer in a one-time command buffer:
//! `UNDEFINED -> TRANSFER_DST_OPTIMAL -> copy -> SHADER_READ_ONLY_OPTIMAL`.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::submit_one_time;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};
use crate::sampler::{Sampler, SamplerDesc};

/// Bytes per RGBA8 texel.
pub const RGBA8_TEXEL_SIZE: usize = 4;

/// An image with a sampler, ready to bind as a combined image sampler.
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Creates a 2D texture from one layer of RGBA8 pixels.
    pub fn from_rgba8(
        device: Arc<Device>,
        name: &str,
        extent: vk::Extent2D,
        pixels: &[u8],
        sampler: SamplerDesc,
    ) -> RhiResult<Self> {
        let desc = ImageDesc::new_2d(name, extent, vk::Format::R8G8B8A8_UNORM, upload_usage());
        Self::upload(device, desc, &[pixels], sampler)
    }

    /// Creates a cube texture from six square RGBA8 faces, in the order
    /// +X, -X, +Y, -Y, +Z, -Z.
    pub fn cube_from_rgba8(
        device: Arc<Device>,
        name: &str,
        edge: u32,
        faces: &[&[u8]],
        sampler: SamplerDesc,
    ) -> RhiResult<Self> {
        let desc = ImageDesc::new_cube(name, edge, vk::Format::R8G8B8A8_UNORM, upload_usage());
        Self::upload(device, desc, faces, sampler)
    }

    fn upload(
        device: Arc<Device>,
        desc: ImageDesc,
        layers: &[&[u8]],
        sampler_desc: SamplerDesc,
    ) -> RhiResult<Self> {
        let layer_size = layer_byte_size(desc.extent);
        check_layers(&desc, layers, layer_size)?;

        let staging = Buffer::new(
            device.clone(),
            BufferUsage::Staging,
            (layer_size * layers.len()) as vk::DeviceSize,
        )?;
        for (layer, pixels) in layers.iter().enumerate() {
            staging.write_data((layer * layer_size) as vk::DeviceSize, pixels)?;
        }

        let image = Image::new(device.clone(), desc)?;
        let regions = copy_regions(image.extent(), layers.len() as u32, layer_size);
        let range = image.full_range();

        submit_one_time(&device, |cmd| {
            let to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.handle())
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[to_transfer],
            );

            cmd.copy_buffer_to_image(
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );

            let to_shader = to_transfer
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[to_shader],
            );
            Ok(())
        })?;

        let sampler = Sampler::new(device, sampler_desc)?;
        info!(
            "Uploaded texture '{}' ({}x{}, {} layer(s))",
            image.desc().name,
            image.extent().width,
            image.extent().height,
            layers.len()
        );

        Ok(Self { image, sampler })
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    /// Image info for a combined image sampler write.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler.handle())
            .image_view(self.image.view())
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }
}

fn upload_usage() -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED
}

fn layer_byte_size(extent: vk::Extent2D) -> usize {
    extent.width as usize * extent.height as usize * RGBA8_TEXEL_SIZE
}

fn check_layers(desc: &ImageDesc, layers: &[&[u8]], layer_size: usize) -> RhiResult<()> {
    if layers.len() != desc.layers as usize {
        return Err(RhiError::TextureError(format!(
            "'{}' expects {} layer(s), got {}",
            desc.name,
            desc.layers,
            layers.len()
        )));
    }
    if let Some((index, layer)) = layers.iter().enumerate().find(|(_, l)| l.len() != layer_size) {
        return Err(RhiError::TextureError(format!(
            "'{}' layer {} has {} bytes, expected {}",
            desc.name,
            index,
            layer.len(),
            layer_size
        )));
    }
    Ok(())
}

/// One copy region per layer, each reading its slice of the staging buffer.
fn copy_regions(
    extent: vk::Extent2D,
    layer_count: u32,
    layer_size: usize,
) -> Vec<vk::BufferImageCopy> {
    (0..layer_count)
        .map(|layer| {
            vk::BufferImageCopy::default()
                .buffer_offset(layer as vk::DeviceSize * layer_size as vk::DeviceSize)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(layer)
                        .layer_count(1),
                )
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(edge: u32) -> vk::Extent2D {
        vk::Extent2D {
            width: edge,
            height: edge,
        }
    }

    #[test]
    fn test_copy_regions_step_through_layers() {
        let size = layer_byte_size(square(4));
        assert_eq!(size, 64);

        let regions = copy_regions(square(4), 6, size);
        assert_eq!(regions.len(), 6);
        for (layer, region) in regions.iter().enumerate() {
            assert_eq!(region.buffer_offset, (layer * 64) as u64);
            assert_eq!(region.image_subresource.base_array_layer, layer as u32);
            assert_eq!(region.image_subresource.layer_count, 1);
        }
    }

    #[test]
    fn test_check_layers_rejects_wrong_count_and_size() {
        let desc = ImageDesc::new_cube("sky", 2, vk::Format::R8G8B8A8_UNORM, upload_usage());
        let face = vec![0u8; 16];
        let faces: Vec<&[u8]> = vec![face.as_slice(); 6];
        assert!(check_layers(&desc, &faces, 16).is_ok());
        assert!(check_layers(&desc, &faces[..5], 16).is_err());

        let short = vec![0u8; 15];
        let mut bad = faces.clone();
        bad[3] = short.as_slice();
        assert!(matches!(
            check_layers(&desc, &bad, 16),
            Err(RhiError::TextureError(_))
        ));
    }
}
