//! Camera and keyboard controller.
//!
//! The world is Y-down: the camera's default up vector is `(0, -1, 0)`,
//! which lets the projection skip the Vulkan Y flip.

use ash::vk;
use glam::{Mat4, Vec3};

use deferred_platform::{HeldKeys, KeyAction, KeyCode};

/// Vertical field of view in degrees.
pub const FOV_Y_DEGREES: f32 = 45.0;
pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 500.0;

/// Vertical look angle limit in degrees.
const VERTICAL_LIMIT_DEGREES: f32 = 90.0;

/// A free-flying perspective camera.
#[derive(Clone, Debug)]
pub struct Camera {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    extent: vk::Extent2D,
    /// Horizontal look angle in degrees, around world Y
    angle_h: f32,
    /// Vertical look angle in degrees, clamped to the limit
    angle_v: f32,
}

impl Camera {
    /// Creates a camera at `position` looking along `forward`.
    pub fn new(position: Vec3, forward: Vec3, up: Vec3, extent: vk::Extent2D) -> Self {
        let forward = forward.normalize();
        let (angle_h, angle_v) = look_angles(forward);
        Self {
            position,
            forward,
            up: up.normalize(),
            extent,
            angle_h,
            angle_v,
        }
    }

    /// The demo scene's starting viewpoint.
    pub fn overlooking(extent: vk::Extent2D) -> Self {
        Self::new(
            Vec3::new(0.0, -40.0, -80.0),
            Vec3::new(0.0, -0.8, 1.0),
            Vec3::new(0.0, -1.0, 0.0),
            extent,
        )
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn set_extent(&mut self, extent: vk::Extent2D) {
        self.extent = extent;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        let aspect = self.extent.width as f32 / self.extent.height.max(1) as f32;
        Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR)
    }

    /// Moves `distance` along the combination of forward, right and up
    /// selected by `movement`.
    pub fn translate(&mut self, movement: Movement, distance: f32) {
        let right = self.forward.cross(self.up).normalize();
        let direction = self.forward * movement.forward as f32
            + right * movement.right as f32
            + self.up * movement.up as f32;
        self.position += direction.normalize_or_zero() * distance;
    }

    /// Turns by the given angles in degrees. The vertical angle is clamped.
    pub fn rotate(&mut self, delta_h: f32, delta_v: f32) {
        self.angle_h = (self.angle_h + delta_h).rem_euclid(360.0);
        self.angle_v =
            (self.angle_v + delta_v).clamp(-VERTICAL_LIMIT_DEGREES, VERTICAL_LIMIT_DEGREES);

        let vertical_axis = Vec3::Y;
        let view = glam::Quat::from_axis_angle(vertical_axis, self.angle_h.to_radians()) * Vec3::Z;
        let horizontal_axis = view.cross(vertical_axis).normalize();
        let view = glam::Quat::from_axis_angle(horizontal_axis, self.angle_v.to_radians()) * view;

        self.forward = view.normalize();
        self.up = self.forward.cross(horizontal_axis).normalize();
    }
}

/// Horizontal and vertical look angles of a forward vector, in degrees.
fn look_angles(forward: Vec3) -> (f32, f32) {
    let horizontal = Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
    let angle_h = horizontal.x.atan2(horizontal.z).to_degrees().rem_euclid(360.0);
    let angle_v = forward.y.asin().to_degrees();
    (angle_h, angle_v)
}

/// Movement along the camera axes; each component is -1, 0 or 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Movement {
    pub forward: i32,
    pub right: i32,
    pub up: i32,
}

impl Movement {
    pub fn is_still(&self) -> bool {
        *self == Self::default()
    }
}

/// Maps held keys to camera movement and rotation.
///
/// W/S move forward and back, D/A right and left, E/Q up and down. The
/// arrow keys turn the camera.
#[derive(Clone, Debug)]
pub struct CameraController {
    keys: HeldKeys,
    /// Units per second
    speed: f32,
    /// Degrees per second
    turn_speed: f32,
}

impl CameraController {
    pub fn new(speed: f32, turn_speed: f32) -> Self {
        Self {
            keys: HeldKeys::new(),
            speed,
            turn_speed,
        }
    }

    pub fn key_down(&mut self, key: KeyCode) {
        self.keys.apply(KeyAction::Down(key));
    }

    pub fn key_up(&mut self, key: KeyCode) {
        self.keys.apply(KeyAction::Up(key));
    }

    pub fn movement(&self) -> Movement {
        Movement {
            forward: self.keys.axis(KeyCode::KeyW, KeyCode::KeyS),
            right: self.keys.axis(KeyCode::KeyD, KeyCode::KeyA),
            up: self.keys.axis(KeyCode::KeyE, KeyCode::KeyQ),
        }
    }

    /// Applies the held keys to `camera` over `delta_secs`.
    pub fn update(&self, camera: &mut Camera, delta_secs: f32) {
        let turn_h = self.keys.axis(KeyCode::ArrowRight, KeyCode::ArrowLeft);
        let turn_v = self.keys.axis(KeyCode::ArrowUp, KeyCode::ArrowDown);
        if turn_h != 0 || turn_v != 0 {
            let step = self.turn_speed * delta_secs;
            camera.rotate(turn_h as f32 * step, turn_v as f32 * step);
        }

        let movement = self.movement();
        if !movement.is_still() {
            camera.translate(movement, self.speed * delta_secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1600,
        height: 900,
    };

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_forward_movement_follows_view() {
        let mut camera = Camera::overlooking(EXTENT);
        let start = camera.position();
        let movement = Movement {
            forward: 1,
            ..Movement::default()
        };
        camera.translate(movement, 10.0);
        assert!(close(camera.position() - start, camera.forward() * 10.0));
    }

    #[test]
    fn test_diagonal_movement_is_normalized() {
        let mut camera = Camera::overlooking(EXTENT);
        let start = camera.position();
        let movement = Movement {
            forward: 1,
            right: 1,
            up: 0,
        };
        camera.translate(movement, 5.0);
        assert!(((camera.position() - start).length() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_still_movement_keeps_position() {
        let mut camera = Camera::overlooking(EXTENT);
        let start = camera.position();
        camera.translate(Movement::default(), 5.0);
        assert_eq!(camera.position(), start);
    }

    #[test]
    fn test_vertical_angle_is_clamped() {
        let mut camera = Camera::overlooking(EXTENT);
        camera.rotate(0.0, 500.0);
        assert!((camera.angle_v - 90.0).abs() < 1e-4);
        camera.rotate(0.0, -1000.0);
        assert!((camera.angle_v + 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_rotation_keeps_forward() {
        let mut camera = Camera::overlooking(EXTENT);
        let forward = camera.forward();
        camera.rotate(0.0, 0.0);
        assert!(close(camera.forward(), forward));
    }

    #[test]
    fn test_projection_follows_extent() {
        let mut camera = Camera::overlooking(EXTENT);
        let wide = camera.projection_matrix();
        camera.set_extent(vk::Extent2D {
            width: 900,
            height: 900,
        });
        let square = camera.projection_matrix();
        assert_ne!(wide, square);
        assert!((square.x_axis.x - square.y_axis.y).abs() < 1e-5);
    }

    #[test]
    fn test_controller_maps_keys_to_movement() {
        let mut controller = CameraController::new(10.0, 90.0);
        controller.key_down(KeyCode::KeyW);
        controller.key_down(KeyCode::KeyA);
        assert_eq!(
            controller.movement(),
            Movement {
                forward: 1,
                right: -1,
                up: 0
            }
        );
        controller.key_up(KeyCode::KeyW);
        assert_eq!(controller.movement().forward, 0);
    }

    #[test]
    fn test_controller_update_scales_by_delta() {
        let mut controller = CameraController::new(10.0, 90.0);
        let mut camera = Camera::overlooking(EXTENT);
        let start = camera.position();
        controller.key_down(KeyCode::KeyS);
        controller.update(&mut camera, 0.5);
        assert!(close(camera.position() - start, -camera.forward() * 5.0));
    }
}
