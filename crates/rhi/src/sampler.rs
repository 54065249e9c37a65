//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Sampler parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    /// Maximum anisotropy; `None` disables anisotropic filtering
    pub anisotropy: Option<f32>,
    pub border_color: vk::BorderColor,
}

impl SamplerDesc {
    /// Linear filtering with repeat addressing, for material textures.
    pub fn linear_repeat() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            anisotropy: Some(16.0),
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        }
    }

    /// Nearest filtering clamped to the edge, for reading render targets
    /// texel-for-texel.
    pub fn nearest_clamp() -> Self {
        Self {
            filter: vk::Filter::NEAREST,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            anisotropy: None,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        }
    }

    /// Samples outside the shadow map read as depth 1.0, i.e. unshadowed.
    pub fn shadow_map() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            anisotropy: None,
            border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
        }
    }

    /// Anisotropy actually applied on a device with `max_supported`
    /// (zero when the feature is unavailable).
    pub fn effective_anisotropy(&self, max_supported: f32) -> Option<f32> {
        match self.anisotropy {
            Some(requested) if max_supported >= 1.0 => Some(requested.min(max_supported)),
            _ => None,
        }
    }
}

/// An owned `VkSampler`.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    pub fn new(device: Arc<Device>, desc: SamplerDesc) -> RhiResult<Self> {
        let max_anisotropy = if device.anisotropy_enabled() {
            device.limits().max_sampler_anisotropy
        } else {
            0.0
        };
        let anisotropy = desc.effective_anisotropy(max_anisotropy);

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.filter)
            .min_filter(desc.filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .border_color(desc.border_color)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        debug!("Created sampler {:?}", desc);

        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_sampler(self.sampler, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anisotropy_clamped_to_device_limit() {
        let desc = SamplerDesc::linear_repeat();
        assert_eq!(desc.effective_anisotropy(8.0), Some(8.0));
        assert_eq!(desc.effective_anisotropy(0.0), None);
    }

    #[test]
    fn test_shadow_map_border_is_white() {
        let desc = SamplerDesc::shadow_map();
        assert_eq!(desc.border_color, vk::BorderColor::FLOAT_OPAQUE_WHITE);
        assert_eq!(desc.effective_anisotropy(16.0), None);
    }
}
