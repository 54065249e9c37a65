//! Vertex layouts shared by the scene meshes and the pipelines.
//!
//! - [`Vertex`]: lit geometry (G-buffer and shadow passes)
//! - [`PositionVertex`]: position-only geometry (skybox cube)
//!
//! Both are `#[repr(C)]` and bound at binding 0 with per-vertex rate.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex input layout of a vertex type.
pub trait VertexLayout: Pod {
    fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

/// Lit mesh vertex.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes), location 0
/// - Offset 12: normal (12 bytes), location 1
/// - Offset 24: tangent (12 bytes), location 2
/// - Offset 36: tex_coord (8 bytes), location 3
/// - Total size: 44 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tangent: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tangent,
            tex_coord,
        }
    }
}

impl VertexLayout for Vertex {
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, 0),
            attribute(1, vk::Format::R32G32B32_SFLOAT, 12),
            attribute(2, vk::Format::R32G32B32_SFLOAT, 24),
            attribute(3, vk::Format::R32G32_SFLOAT, 36),
        ]
    }
}

/// Position-only vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PositionVertex {
    pub position: Vec3,
}

impl PositionVertex {
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vec3::new(x, y, z),
        }
    }
}

impl VertexLayout for PositionVertex {
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![attribute(0, vk::Format::R32G32B32_SFLOAT, 0)]
    }
}

fn attribute(
    location: u32,
    format: vk::Format,
    offset: u32,
) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        binding: 0,
        location,
        format,
        offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_vertex_size_and_stride() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 44);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_offsets_match_attributes() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs[0].offset as usize, offset_of!(Vertex, position));
        assert_eq!(attrs[1].offset as usize, offset_of!(Vertex, normal));
        assert_eq!(attrs[2].offset as usize, offset_of!(Vertex, tangent));
        assert_eq!(attrs[3].offset as usize, offset_of!(Vertex, tex_coord));
        assert_eq!(attrs[3].format, vk::Format::R32G32_SFLOAT);

        for (location, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.location, location as u32);
            assert_eq!(attr.binding, 0);
        }
    }

    #[test]
    fn test_position_vertex_layout() {
        assert_eq!(std::mem::size_of::<PositionVertex>(), 12);
        assert_eq!(PositionVertex::binding_description().stride, 12);

        let attrs = PositionVertex::attribute_descriptions();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn test_vertex_casts_to_bytes() {
        let vertices = [
            Vertex::new(Vec3::X, Vec3::Y, Vec3::Z, Vec2::ONE),
            Vertex::default(),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 88);

        let back: &[Vertex] = bytemuck::cast_slice(bytes);
        assert_eq!(back[0], vertices[0]);
    }
}
