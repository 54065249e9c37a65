//! Uniform buffer layouts shared with the GLSL shaders.
//!
//! All structures are `#[repr(C)]`, `Pod` and laid out for std140: every
//! `vec3` is followed by a scalar so it fills a 16-byte slot.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Camera matrices (`ViewProj` block, geometry and skybox shaders).
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ViewProjUbo {
    pub view: Mat4,
    pub projection: Mat4,
}

impl ViewProjUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// World transform of one model (`Transform` block).
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: normal matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct TransformUbo {
    pub model: Mat4,
    /// Inverse transpose of `model`, for normals.
    pub normal_matrix: Mat4,
}

impl TransformUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(model: Mat4) -> Self {
        Self {
            model,
            normal_matrix: model.inverse().transpose(),
        }
    }
}

/// Directional light attributes (`Lighting` block).
///
/// # Memory Layout
///
/// - Offset 0: color (12 bytes), ambient strength (4 bytes)
/// - Offset 16: direction (12 bytes), diffuse strength (4 bytes)
/// - Offset 32: camera position (12 bytes), specular power (4 bytes)
/// - Total size: 48 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightingUbo {
    pub color: Vec3,
    pub ambient_strength: f32,
    pub direction: Vec3,
    pub diffuse_strength: f32,
    pub camera_position: Vec3,
    pub specular_power: f32,
}

impl LightingUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Light view-projection (`LightSpace` block, depth and lighting shaders).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct LightSpaceUbo {
    pub space: Mat4,
}

impl LightSpaceUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Per-mesh material constants (`Material` block).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUbo {
    /// Multiplied with the sampled texture
    pub base_color: Vec4,
}

impl MaterialUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(base_color: Vec4) -> Self {
        Self { base_color }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_sizes_match_std140() {
        assert_eq!(ViewProjUbo::SIZE, 128);
        assert_eq!(TransformUbo::SIZE, 128);
        assert_eq!(LightingUbo::SIZE, 48);
        assert_eq!(LightSpaceUbo::SIZE, 64);
        assert_eq!(MaterialUbo::SIZE, 16);
    }

    #[test]
    fn test_lighting_vec3_fields_start_slots() {
        assert_eq!(offset_of!(LightingUbo, color), 0);
        assert_eq!(offset_of!(LightingUbo, direction), 16);
        assert_eq!(offset_of!(LightingUbo, camera_position), 32);
        assert_eq!(offset_of!(LightingUbo, specular_power), 44);
    }

    #[test]
    fn test_normal_matrix_of_uniform_scale_keeps_direction() {
        let ubo = TransformUbo::new(Mat4::from_scale(Vec3::splat(2.0)));
        let normal = ubo.normal_matrix.transform_vector3(Vec3::Y).normalize();
        assert!((normal - Vec3::Y).length() < 1e-6);
    }
}
