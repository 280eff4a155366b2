//! Rotation helpers and frame conversions.

use nalgebra::{Matrix3, Matrix4};

use super::types::Rotation;

/// Rotation matrix for a simulator rotation (degrees, left-handed frame).
pub fn rotation_matrix(rotation: &Rotation) -> Matrix3<f64> {
    let (sp, cp) = rotation.pitch.to_radians().sin_cos();
    let (sy, cy) = rotation.yaw.to_radians().sin_cos();
    let (sr, cr) = rotation.roll.to_radians().sin_cos();

    Matrix3::new(
        cp * cy,
        cy * sp * sr - sy * cr,
        -cy * sp * cr - sy * sr,
        cp * sy,
        sy * sp * sr + cy * cr,
        -sy * sp * cr + cy * sr,
        sp,
        -cp * sr,
        cp * cr,
    )
}

/// Recover pitch/yaw/roll (degrees) from a matrix built by [`rotation_matrix`].
pub fn rotation_from_matrix(m: &Matrix3<f64>) -> Rotation {
    let pitch = m[(2, 0)].clamp(-1.0, 1.0).asin();
    let yaw = m[(1, 0)].atan2(m[(0, 0)]);
    let roll = (-m[(2, 1)]).atan2(m[(2, 2)]);
    Rotation::new(pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
}

/// Axis remap from a sensor's simulator-local frame to the camera frame.
///
/// Simulator sensor frame: X-forward, Y-right, Z-up.
/// Camera frame: X-right, Y-down, Z-forward (the frame the pinhole intrinsics
/// expect). A sensor-local point `(x, y, z)` becomes `(y, -z, x)`.
pub fn sensor_to_camera_axes() -> Matrix4<f64> {
    Matrix4::new(
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, -1.0, 0.0, //
        1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Wrap an angle in degrees to (-180, 180].
#[inline]
pub fn normalize_degrees(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a <= -180.0 {
        a += 360.0;
    }
    a
}
