//! World-to-pixel projection of oriented boxes.
//!
//! # Frames
//!
//! Simulator frames are left-handed X-forward, Y-right, Z-up. The camera
//! frame used here is X-right, Y-down, Z-forward, so that a camera-space point
//! `p` projects to pixels as `K * p / p.z`. The remap between the two is
//! [`sensor_to_camera_axes`].
//!
//! # Image rectangle
//!
//! Pixel coordinates address pixel centers. Boxes are clipped to
//! `[0, width - 1] x [0, height - 1]`, so every clipped coordinate floors to
//! a valid pixel index.

use nalgebra::{Matrix3, Matrix4, Point3};
use serde::{Deserialize, Serialize};

use crate::core::math::sensor_to_camera_axes;
use crate::core::{BOX_EDGES, Transform};

/// Default near clipping plane (meters in front of the camera).
pub const DEFAULT_NEAR_PLANE: f64 = 0.01;

/// Axis-aligned box in floating pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl PixelBox {
    /// Bounding box of a point set, `None` if empty.
    pub fn enclosing(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let mut b = PixelBox {
            xmin: x,
            ymin: y,
            xmax: x,
            ymax: y,
        };
        for (x, y) in iter {
            b.xmin = b.xmin.min(x);
            b.ymin = b.ymin.min(y);
            b.xmax = b.xmax.max(x);
            b.ymax = b.ymax.max(y);
        }
        Some(b)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.xmin.is_finite() && self.ymin.is_finite() && self.xmax.is_finite() && self.ymax.is_finite()
    }

    /// Intersection with the image rectangle, `None` if nothing remains.
    pub fn clip(&self, width: u32, height: u32) -> Option<PixelBox> {
        let max_x = width.checked_sub(1)? as f64;
        let max_y = height.checked_sub(1)? as f64;
        let clipped = PixelBox {
            xmin: self.xmin.max(0.0),
            ymin: self.ymin.max(0.0),
            xmax: self.xmax.min(max_x),
            ymax: self.ymax.min(max_y),
        };
        (clipped.width() > 0.0 && clipped.height() > 0.0).then_some(clipped)
    }

    /// Integer pixel box by flooring, `None` if it collapses.
    pub fn to_pixels(&self) -> Option<PixelRect> {
        let rect = PixelRect {
            xmin: self.xmin.floor() as u32,
            ymin: self.ymin.floor() as u32,
            xmax: self.xmax.floor() as u32,
            ymax: self.ymax.floor() as u32,
        };
        (rect.xmax > rect.xmin && rect.ymax > rect.ymin).then_some(rect)
    }
}

/// Axis-aligned box in integer pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub xmin: u32,
    pub ymin: u32,
    pub xmax: u32,
    pub ymax: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> u32 {
        self.ymax - self.ymin
    }

    /// Normalized `(x_center, y_center, width, height)`.
    pub fn to_yolo(&self, image_width: u32, image_height: u32) -> (f64, f64, f64, f64) {
        let (w, h) = (image_width as f64, image_height as f64);
        (
            (self.xmin + self.xmax) as f64 / 2.0 / w,
            (self.ymin + self.ymax) as f64 / 2.0 / h,
            self.width() as f64 / w,
            self.height() as f64 / h,
        )
    }
}

/// Matrix taking points local to `target` into camera space.
///
/// Composes the target's local-to-world transform, the inverse of the camera
/// pose and the sensor-to-camera axis remap.
pub fn world_to_camera(target: &Transform, camera_pose: &Transform) -> Matrix4<f64> {
    sensor_to_camera_axes() * camera_pose.inverse_matrix() * target.matrix()
}

/// World point to camera space.
pub fn to_camera(point: &Point3<f64>, camera_pose: &Transform) -> Point3<f64> {
    let m = sensor_to_camera_axes() * camera_pose.inverse_matrix();
    m.transform_point(point)
}

/// Pixel coordinates of a camera-space point, `None` at or behind the camera.
pub fn project_point(point: &Point3<f64>, intrinsics: &Matrix3<f64>) -> Option<(f64, f64)> {
    if point.z <= 0.0 {
        return None;
    }
    let q = intrinsics * point.coords;
    Some((q.x / q.z, q.y / q.z))
}

/// Unclipped image-plane box of 8 camera-space corners.
///
/// Corners closer than `near` are replaced by the points where their box edges
/// cross the near plane, so a box straddling the camera yields a large but
/// finite box instead of a wrapped or unbounded one.
pub fn project_corners(
    corners: &[Point3<f64>; 8],
    intrinsics: &Matrix3<f64>,
    near: f64,
) -> Option<PixelBox> {
    if corners.iter().all(|c| c.z < near) {
        return None;
    }

    let mut points: Vec<Point3<f64>> = corners.iter().filter(|c| c.z >= near).copied().collect();
    for (a, b) in BOX_EDGES {
        let (pa, pb) = (corners[a], corners[b]);
        if (pa.z < near) != (pb.z < near) {
            let t = (near - pa.z) / (pb.z - pa.z);
            points.push(pa + (pb - pa) * t);
        }
    }

    PixelBox::enclosing(points.iter().filter_map(|p| project_point(p, intrinsics)))
}

/// Pixel box of a world-space box, clipped to the image.
///
/// Returns `None` when the box is entirely behind the near plane or nothing
/// remains after clipping.
pub fn project_bounding_box(
    world_corners: &[Point3<f64>; 8],
    camera_pose: &Transform,
    intrinsics: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> Option<PixelBox> {
    project_bounding_box_with_near(world_corners, camera_pose, intrinsics, width, height, DEFAULT_NEAR_PLANE)
}

/// [`project_bounding_box`] with an explicit near plane.
pub fn project_bounding_box_with_near(
    world_corners: &[Point3<f64>; 8],
    camera_pose: &Transform,
    intrinsics: &Matrix3<f64>,
    width: u32,
    height: u32,
    near: f64,
) -> Option<PixelBox> {
    let m = sensor_to_camera_axes() * camera_pose.inverse_matrix();
    let camera_corners = world_corners.map(|c| m.transform_point(&c));
    project_corners(&camera_corners, intrinsics, near)?.clip(width, height)
}
