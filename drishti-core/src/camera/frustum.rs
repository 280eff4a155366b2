//! View frustum quick reject.

use nalgebra::{Point3, Vector4};

use super::calibration::CameraCalibration;

/// Half-space planes of the camera frustum in camera coordinates.
///
/// A point `p` is inside when `plane.dot([p, 1]) >= 0` for every plane.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vector4<f64>; 5],
}

impl Frustum {
    /// Frustum spanning the image rectangle, beyond `near` meters.
    pub fn new(calibration: &CameraCalibration, near: f64) -> Self {
        let k = calibration.intrinsics();
        let (fx, fy, cx, cy) = (k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]);
        let max_u = calibration.width().saturating_sub(1) as f64;
        let max_v = calibration.height().saturating_sub(1) as f64;

        // u = fx * x / z + cx, so u >= 0  <=>  fx * x + cx * z >= 0 for z > 0.
        Self {
            planes: [
                Vector4::new(0.0, 0.0, 1.0, -near),
                Vector4::new(fx, 0.0, cx, 0.0),
                Vector4::new(-fx, 0.0, max_u - cx, 0.0),
                Vector4::new(0.0, fy, cy, 0.0),
                Vector4::new(0.0, -fy, max_v - cy, 0.0),
            ],
        }
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let h = p.to_homogeneous();
        self.planes.iter().all(|plane| plane.dot(&h) >= 0.0)
    }

    /// True when every corner lies outside one plane, so nothing can be visible.
    pub fn culls(&self, corners: &[Point3<f64>]) -> bool {
        self.planes.iter().any(|plane| {
            corners
                .iter()
                .all(|p| plane.dot(&p.to_homogeneous()) < 0.0)
        })
    }
}
