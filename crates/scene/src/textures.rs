//! Procedurally generated RGBA8 textures.

use glam::{Vec2, Vec3};

use deferred_rhi::image::CUBE_FACE_COUNT;
use deferred_rhi::texture::RGBA8_TEXEL_SIZE;

/// A `size` x `size` checkerboard of `tile`-texel squares.
pub fn checkerboard(size: u32, tile: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let tile = tile.max(1);
    let mut pixels = Vec::with_capacity((size * size) as usize * RGBA8_TEXEL_SIZE);
    for y in 0..size {
        for x in 0..size {
            let even = (x / tile + y / tile) % 2 == 0;
            pixels.extend_from_slice(if even { &a } else { &b });
        }
    }
    pixels
}

/// Direction through texel coordinate `uv` (each in `-1..=1`) of cube
/// face `face`, in +X, -X, +Y, -Y, +Z, -Z order.
pub fn cube_face_direction(face: u32, uv: Vec2) -> Vec3 {
    let (u, v) = (uv.x, uv.y);
    match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    }
}

/// Sky color seen along `direction`. Up is negative Y.
pub fn sky_color(direction: Vec3) -> [u8; 4] {
    const ZENITH: Vec3 = Vec3::new(0.18, 0.36, 0.74);
    const HORIZON: Vec3 = Vec3::new(0.78, 0.86, 0.95);
    const GROUND: Vec3 = Vec3::new(0.32, 0.30, 0.27);

    let elevation = -direction.normalize().y;
    let color = if elevation >= 0.0 {
        HORIZON.lerp(ZENITH, elevation.sqrt())
    } else {
        GROUND
    };
    let [r, g, b] = (color * 255.0).round().to_array();
    [r as u8, g as u8, b as u8, 255]
}

/// Six faces of a sky gradient cube map, each `edge` x `edge`.
pub fn sky_faces(edge: u32) -> Vec<Vec<u8>> {
    (0..CUBE_FACE_COUNT)
        .map(|face| {
            let mut pixels = Vec::with_capacity((edge * edge) as usize * RGBA8_TEXEL_SIZE);
            for y in 0..edge {
                for x in 0..edge {
                    let uv = (Vec2::new(x as f32, y as f32) + 0.5) / edge as f32 * 2.0 - 1.0;
                    pixels.extend_from_slice(&sky_color(cube_face_direction(face, uv)));
                }
            }
            pixels
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_alternates_tiles() {
        let white = [255; 4];
        let black = [0, 0, 0, 255];
        let pixels = checkerboard(4, 2, white, black);
        assert_eq!(pixels.len(), 4 * 4 * 4);

        let texel = |x: usize, y: usize| &pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(texel(0, 0), white);
        assert_eq!(texel(1, 1), white);
        assert_eq!(texel(2, 0), black);
        assert_eq!(texel(2, 2), white);
    }

    #[test]
    fn test_face_centers_point_along_axes() {
        let axes = [
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
        ];
        for (face, axis) in axes.into_iter().enumerate() {
            assert_eq!(cube_face_direction(face as u32, Vec2::ZERO), axis);
        }
    }

    #[test]
    fn test_sky_is_brighter_blue_overhead() {
        let zenith = sky_color(Vec3::NEG_Y);
        let horizon = sky_color(Vec3::X);
        let ground = sky_color(Vec3::Y);
        assert!(zenith[2] > zenith[0]);
        assert!(horizon[0] > zenith[0]);
        assert_ne!(ground, horizon);
    }

    #[test]
    fn test_sky_faces_are_square_layers() {
        let faces = sky_faces(8);
        assert_eq!(faces.len(), CUBE_FACE_COUNT as usize);
        assert!(faces.iter().all(|face| face.len() == 8 * 8 * RGBA8_TEXEL_SIZE));
    }
}
