//! View camera
//!
//! Stores the view matrix together with its inverse and updates both
//! incrementally, so neither is ever recomputed by a general inversion.

use crate::foundation::math::{Mat4, Rotation3, Unit, Vec3};

/// Camera forward in camera space
pub const FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);
/// Camera left in camera space
pub const LEFT: Vec3 = Vec3::new(-1.0, 0.0, 0.0);
/// Camera up in camera space
pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// Camera with an incrementally maintained inverse view
#[derive(Debug, Clone)]
pub struct ViewCamera {
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for ViewCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewCamera {
    /// Camera at the origin looking down -Z
    pub fn new() -> Self {
        Self {
            view: Mat4::identity(),
            inverse_view: Mat4::identity(),
        }
    }

    /// Replace the view matrix; a singular matrix leaves the camera unchanged
    pub fn set_transform(&mut self, view: Mat4) -> bool {
        match view.try_inverse() {
            Some(inverse) => {
                self.view = view;
                self.inverse_view = inverse;
                true
            }
            None => {
                log::warn!("Ignoring singular camera transform");
                false
            }
        }
    }

    /// Translate along `v` in camera space without changing orientation
    pub fn move_by(&mut self, v: &Vec3) {
        self.view = Mat4::new_translation(&-v) * self.view;
        self.inverse_view *= Mat4::new_translation(v);
    }

    /// Rotate about `axis` in camera space
    pub fn rotate(&mut self, axis: &Vec3, radians: f32) {
        let axis = Unit::new_normalize(*axis);
        let rotation = Rotation3::from_axis_angle(&axis, radians).to_homogeneous();
        let inverse = Rotation3::from_axis_angle(&axis, -radians).to_homogeneous();
        self.view = inverse * self.view;
        self.inverse_view *= rotation;
    }

    /// View matrix
    pub const fn view(&self) -> &Mat4 {
        &self.view
    }

    /// Inverse view matrix (camera to world)
    pub const fn inverse_view(&self) -> &Mat4 {
        &self.inverse_view
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.inverse_view[(0, 3)], self.inverse_view[(1, 3)], self.inverse_view[(2, 3)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_move_keeps_inverse_in_sync() {
        let mut camera = ViewCamera::new();
        camera.move_by(&Vec3::new(1.0, -2.0, 3.0));
        camera.rotate(&UP, 0.3);
        camera.move_by(&(FORWARD * 5.0));

        let product = camera.view() * camera.inverse_view();
        assert_relative_eq!(product, Mat4::identity(), epsilon = 1e-5);
    }

    #[test]
    fn test_position_follows_moves() {
        let mut camera = ViewCamera::new();
        camera.move_by(&Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(camera.position(), Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-6);

        // Moves are in camera space: after a quarter turn about up, forward is -X
        camera.rotate(&UP, FRAC_PI_2);
        camera.move_by(&FORWARD);
        assert_relative_eq!(camera.position(), Vec3::new(0.0, 2.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_singular_transform_rejected() {
        let mut camera = ViewCamera::new();
        assert!(!camera.set_transform(Mat4::zeros()));
        assert_eq!(*camera.view(), Mat4::identity());
        assert!(camera.set_transform(Mat4::new_scaling(2.0)));
        assert_relative_eq!(camera.inverse_view()[(0, 0)], 0.5);
    }
}
