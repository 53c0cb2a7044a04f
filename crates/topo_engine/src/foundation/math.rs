//! Math utilities and types
//!
//! nalgebra aliases plus the handful of projection helpers the renderer needs.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Rotation3,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Right-handed orthographic projection (OpenGL clip conventions)
pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    Mat4::new_orthographic(left, right, bottom, top, near, far)
}

/// Rotate `point` about the Z axis through `center`
pub fn rotate_about_z(point: Vec3, center: Vec3, radians: f32) -> Vec3 {
    let rotation = Rotation3::from_axis_angle(&Vec3::z_axis(), radians);
    rotation * (point - center) + center
}

/// Inverse-transpose of a matrix, used for normal transforms
///
/// Returns the identity when `m` is singular.
pub fn inverse_transpose(m: &Mat4) -> Mat4 {
    m.try_inverse().map_or_else(Mat4::identity, |inv| inv.transpose())
}
