//! Procedural meshes and their GPU buffers.
//!
//! The world is Y-down, so surfaces facing the sky have normal `(0, -1, 0)`.

use std::sync::Arc;

use ash::vk;
use glam::{Vec2, Vec3};

use deferred_rhi::RhiResult;
use deferred_rhi::buffer::{Buffer, BufferUsage};
use deferred_rhi::command::CommandBuffer;
use deferred_rhi::device::Device;
use deferred_rhi::vertex::{PositionVertex, Vertex, VertexLayout};

/// CPU-side indexed triangle list.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData<V> {
    pub vertices: Vec<V>,
    pub indices: Vec<u32>,
}

impl<V> MeshData<V> {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Appends one quad with corners `a b c d` in counter-clockwise order as
/// seen from the side `normal` points to.
fn push_quad(
    mesh: &mut MeshData<Vertex>,
    corners: [Vec3; 4],
    normal: Vec3,
    tangent: Vec3,
    uv_scale: f32,
) {
    let base = mesh.vertices.len() as u32;
    let uvs = [
        Vec2::new(0.0, 0.0),
        Vec2::new(uv_scale, 0.0),
        Vec2::new(uv_scale, uv_scale),
        Vec2::new(0.0, uv_scale),
    ];
    for (corner, uv) in corners.into_iter().zip(uvs) {
        mesh.vertices.push(Vertex::new(corner, normal, tangent, uv));
    }
    mesh.indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// A square ground plane at height `y`, facing up (negative Y).
pub fn ground_plane(half_size: f32, y: f32, uv_repeat: f32) -> MeshData<Vertex> {
    let mut mesh = MeshData {
        vertices: Vec::with_capacity(4),
        indices: Vec::with_capacity(6),
    };
    let s = half_size;
    push_quad(
        &mut mesh,
        [
            Vec3::new(-s, y, -s),
            Vec3::new(s, y, -s),
            Vec3::new(s, y, s),
            Vec3::new(-s, y, s),
        ],
        Vec3::NEG_Y,
        Vec3::X,
        uv_repeat,
    );
    mesh
}

/// An axis-aligned box with per-face normals and tangents.
pub fn cuboid(center: Vec3, half_extent: Vec3) -> MeshData<Vertex> {
    let mut mesh = MeshData {
        vertices: Vec::with_capacity(24),
        indices: Vec::with_capacity(36),
    };

    // (normal, tangent); the bitangent is normal x tangent.
    let faces = [
        (Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_X, Vec3::Z),
        (Vec3::Y, Vec3::X),
        (Vec3::NEG_Y, Vec3::X),
        (Vec3::Z, Vec3::X),
        (Vec3::NEG_Z, Vec3::NEG_X),
    ];
    for (normal, tangent) in faces {
        let bitangent = normal.cross(tangent);
        let offset = |t: f32, b: f32| {
            center + (normal + tangent * t + bitangent * b) * half_extent
        };
        push_quad(
            &mut mesh,
            [
                offset(-1.0, -1.0),
                offset(1.0, -1.0),
                offset(1.0, 1.0),
                offset(-1.0, 1.0),
            ],
            normal,
            tangent,
            1.0,
        );
    }
    mesh
}

/// The unit skybox cube.
pub fn skybox_cube() -> MeshData<PositionVertex> {
    MeshData {
        vertices: vec![
            PositionVertex::new(-1.0, -1.0, -1.0),
            PositionVertex::new(-1.0, 1.0, -1.0),
            PositionVertex::new(1.0, -1.0, -1.0),
            PositionVertex::new(1.0, 1.0, -1.0),
            PositionVertex::new(1.0, -1.0, 1.0),
            PositionVertex::new(1.0, 1.0, 1.0),
            PositionVertex::new(-1.0, -1.0, 1.0),
            PositionVertex::new(-1.0, 1.0, 1.0),
        ],
        indices: vec![
            0, 1, 2, 2, 1, 3, //
            2, 3, 4, 4, 3, 5, //
            4, 5, 6, 6, 5, 7, //
            6, 7, 0, 0, 7, 1, //
            6, 0, 2, 2, 4, 6, //
            7, 5, 3, 7, 3, 1,
        ],
    }
}

/// Vertex and index buffers in device-local memory.
pub struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl GpuMesh {
    /// Uploads `mesh` through staging buffers. Blocks until done.
    pub fn upload<V: VertexLayout>(device: &Arc<Device>, mesh: &MeshData<V>) -> RhiResult<Self> {
        let vertex_buffer = Buffer::device_local_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = Buffer::device_local_with_data(
            device.clone(),
            BufferUsage::Index,
            bytemuck::cast_slice(&mesh.indices),
        )?;
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        })
    }

    /// Binds the buffers and draws every index.
    pub fn draw(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT32);
        cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_range<V>(mesh: &MeshData<V>) {
        let count = mesh.vertices.len() as u32;
        assert!(mesh.indices.iter().all(|&index| index < count));
        assert_eq!(mesh.indices.len() % 3, 0);
    }

    #[test]
    fn test_skybox_is_eight_vertices_twelve_triangles() {
        let sky = skybox_cube();
        assert_eq!(sky.vertices.len(), 8);
        assert_eq!(sky.indices.len(), 36);
        assert_eq!(sky.triangle_count(), 12);
        assert_indices_in_range(&sky);
    }

    #[test]
    fn test_ground_faces_up() {
        let ground = ground_plane(100.0, 0.0, 8.0);
        assert_eq!(ground.triangle_count(), 2);
        assert!(ground.vertices.iter().all(|v| v.normal == Vec3::NEG_Y));
        assert!(ground.vertices.iter().all(|v| v.position.y == 0.0));
    }

    #[test]
    fn test_quad_winding_matches_normal() {
        let ground = ground_plane(1.0, 0.0, 1.0);
        let [a, b, c] = [0, 1, 2].map(|i| ground.vertices[ground.indices[i] as usize].position);
        let face_normal = (b - a).cross(c - a).normalize();
        assert!((face_normal - Vec3::NEG_Y).length() < 1e-6);
    }

    #[test]
    fn test_cuboid_faces_sit_on_the_box() {
        let center = Vec3::new(5.0, -2.0, 1.0);
        let half = Vec3::new(1.0, 2.0, 3.0);
        let cube = cuboid(center, half);

        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert_indices_in_range(&cube);
        for vertex in &cube.vertices {
            let local = (vertex.position - center) / half;
            assert!((local.dot(vertex.normal) - 1.0).abs() < 1e-5);
            assert!(vertex.tangent.dot(vertex.normal).abs() < 1e-6);
        }
    }

    #[test]
    fn test_cuboid_winding_is_outward() {
        let cube = cuboid(Vec3::ZERO, Vec3::ONE);
        for triangle in cube.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| cube.vertices[triangle[i] as usize]);
            let face_normal = (b.position - a.position).cross(c.position - a.position);
            assert!(face_normal.dot(a.normal) > 0.0);
        }
    }
}
