//! Spatial types in the simulator's world frame.
//!
//! The simulator uses a left-handed frame:
//! - X-forward, Y-right, Z-up
//! - Rotations in degrees: pitch about Y, yaw about Z, roll about X
//! - Positive yaw turns X toward Y (clockwise seen from above)

use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::math::{rotation_from_matrix, rotation_matrix};

/// Identifier of an actor inside the simulator.
pub type ActorId = u64;

/// A position in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    /// Origin.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another location.
    #[inline]
    pub fn distance(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance ignoring height.
    #[inline]
    pub fn distance_2d(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    #[inline]
    pub fn to_point(self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }

    #[inline]
    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    #[inline]
    pub fn from_point(p: &Point3<f64>) -> Self {
        Self::new(p.x, p.y, p.z)
    }

    /// Component-wise offset.
    #[inline]
    pub fn offset(self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// Orientation in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Rotation {
    #[inline]
    pub const fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Rotation about Z only.
    #[inline]
    pub const fn from_yaw(yaw: f64) -> Self {
        Self {
            pitch: 0.0,
            yaw,
            roll: 0.0,
        }
    }

    /// Unit forward (local X) vector in world coordinates.
    pub fn forward(&self) -> Vector3<f64> {
        let (sp, cp) = self.pitch.to_radians().sin_cos();
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        Vector3::new(cp * cy, cp * sy, sp)
    }
}

/// Pose of an actor or sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub location: Location,
    pub rotation: Rotation,
}

impl Transform {
    #[inline]
    pub const fn new(location: Location, rotation: Rotation) -> Self {
        Self { location, rotation }
    }

    /// Identity transform.
    #[inline]
    pub const fn identity() -> Self {
        Self {
            location: Location::ZERO,
            rotation: Rotation::new(0.0, 0.0, 0.0),
        }
    }

    /// Local-to-world homogeneous matrix.
    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = rotation_matrix(&self.rotation).to_homogeneous();
        m[(0, 3)] = self.location.x;
        m[(1, 3)] = self.location.y;
        m[(2, 3)] = self.location.z;
        m
    }

    /// World-to-local homogeneous matrix.
    pub fn inverse_matrix(&self) -> Matrix4<f64> {
        let r = rotation_matrix(&self.rotation);
        let rt = r.transpose();
        let t = -(rt * self.location.to_vector());
        let mut m = rt.to_homogeneous();
        m[(0, 3)] = t.x;
        m[(1, 3)] = t.y;
        m[(2, 3)] = t.z;
        m
    }

    /// Map a point from this transform's local frame to world.
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        let r = rotation_matrix(&self.rotation);
        Point3::from(r * local.coords + self.location.to_vector())
    }

    /// Compose `self * child`: `child` is expressed relative to `self`.
    pub fn compose(&self, child: &Transform) -> Transform {
        let location = self.transform_point(&child.location.to_point());
        let rotation = rotation_matrix(&self.rotation) * rotation_matrix(&child.rotation);
        Transform {
            location: Location::from_point(&location),
            rotation: rotation_from_matrix(&rotation),
        }
    }
}

/// Oriented 3D box relative to its owning actor.
///
/// `extent` holds half-sizes along the box's local axes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub location: Location,
    pub extent: Location,
    pub rotation: Rotation,
}

/// Corner index pairs forming the 12 edges of a box.
///
/// Corner `i` uses `-extent` on an axis when the matching bit of `i` is clear
/// (bit 0 = X, bit 1 = Y, bit 2 = Z), so edges join indices differing in one bit.
pub const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

impl BoundingBox {
    #[inline]
    pub const fn new(location: Location, extent: Location, rotation: Rotation) -> Self {
        Self {
            location,
            extent,
            rotation,
        }
    }

    /// Axis-aligned box centered at `location`.
    #[inline]
    pub const fn axis_aligned(location: Location, extent: Location) -> Self {
        Self::new(location, extent, Rotation::new(0.0, 0.0, 0.0))
    }

    /// Pose of the box center relative to its actor.
    #[inline]
    pub fn local_transform(&self) -> Transform {
        Transform::new(self.location, self.rotation)
    }

    /// The 8 corners in the box's own frame, centered at the origin.
    pub fn local_vertices(&self) -> [Point3<f64>; 8] {
        let e = self.extent;
        std::array::from_fn(|i| {
            let sx = if i & 1 == 0 { -1.0 } else { 1.0 };
            let sy = if i & 2 == 0 { -1.0 } else { 1.0 };
            let sz = if i & 4 == 0 { -1.0 } else { 1.0 };
            Point3::new(sx * e.x, sy * e.y, sz * e.z)
        })
    }

    /// The 8 corners in world coordinates given the owning actor's transform.
    pub fn world_vertices(&self, actor: &Transform) -> [Point3<f64>; 8] {
        let local = self.local_transform();
        self.local_vertices()
            .map(|v| actor.transform_point(&local.transform_point(&v)))
    }

    /// Box center in world coordinates.
    pub fn world_center(&self, actor: &Transform) -> Point3<f64> {
        actor.transform_point(&self.location.to_point())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_matrix_roundtrips() {
        let t = Transform::new(
            Location::new(3.0, -2.0, 1.5),
            Rotation::new(10.0, 35.0, -5.0),
        );
        let product = t.matrix() * t.inverse_matrix();
        for r in 0..4 {
            for c in 0..4 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert_relative_eq!(product[(r, c)], expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_positive_yaw_turns_right() {
        let t = Transform::new(Location::ZERO, Rotation::from_yaw(90.0));
        let p = t.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_world_vertices_axis_aligned() {
        let bbox = BoundingBox::axis_aligned(Location::new(0.0, 0.0, 1.0), Location::new(1.0, 2.0, 0.5));
        let actor = Transform::new(Location::new(10.0, 0.0, 0.0), Rotation::default());
        let corners = bbox.world_vertices(&actor);
        assert_relative_eq!(corners[0].x, 9.0);
        assert_relative_eq!(corners[0].y, -2.0);
        assert_relative_eq!(corners[0].z, 0.5);
        assert_relative_eq!(corners[7].x, 11.0);
        assert_relative_eq!(corners[7].y, 2.0);
        assert_relative_eq!(corners[7].z, 1.5);
    }

    #[test]
    fn test_box_edges_differ_in_one_axis() {
        for (a, b) in BOX_EDGES {
            assert_eq!((a ^ b).count_ones(), 1);
        }
    }
}
