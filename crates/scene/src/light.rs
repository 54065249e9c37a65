//! Directional lighting and the shadow-map projection.

use glam::{Mat4, Vec3};

use crate::ubo::{LightSpaceUbo, LightingUbo};

/// A directional light that follows the camera.
///
/// The shadow map covers a cube of half extent `space_radius` centred on
/// the camera, seen along the light direction.
#[derive(Clone, Debug)]
pub struct DirectionalLight {
    attributes: LightingUbo,
    projection: Mat4,
}

impl DirectionalLight {
    pub fn new(attributes: LightingUbo, space_radius: f32) -> Self {
        let r = space_radius;
        let mut projection = Mat4::orthographic_rh(-r, r, -r, r, -r, r);
        projection.y_axis.y *= -1.0;
        Self {
            attributes,
            projection,
        }
    }

    /// White sunlight from low in the sky.
    pub fn sun(camera_position: Vec3, space_radius: f32) -> Self {
        Self::new(
            LightingUbo {
                color: Vec3::ONE,
                ambient_strength: 0.8,
                direction: Vec3::new(-0.89, 0.4, -0.21),
                diffuse_strength: 0.7,
                camera_position,
                specular_power: 2.0,
            },
            space_radius,
        )
    }

    pub fn attributes(&self) -> &LightingUbo {
        &self.attributes
    }

    /// Re-centres the light on the camera.
    pub fn update(&mut self, camera_position: Vec3) {
        self.attributes.camera_position = camera_position;
    }

    /// World to light clip space.
    pub fn space_matrix(&self) -> Mat4 {
        let center = self.attributes.camera_position;
        let eye = center - self.attributes.direction.normalize();
        let view = Mat4::look_at_rh(eye, center, Vec3::new(0.0, -1.0, 0.0));
        self.projection * view
    }

    pub fn space_ubo(&self) -> LightSpaceUbo {
        LightSpaceUbo {
            space: self.space_matrix(),
        }
    }
}
