//! Ray-cast occlusion heuristic.
//!
//! A target counts as occluded when the segment from the camera to the target
//! center passes through the bounding box of an opaque actor strictly before
//! reaching the target. Only buildings and vehicles are opaque; vegetation,
//! signals and everything else are see-through, which can only hide fewer
//! targets than exact visibility would.

use nalgebra::{Point3, Vector3};

use crate::core::Transform;
use crate::sim::{ActorCategory, ActorSnapshot};

/// Actors that block the line of sight.
pub fn is_opaque(category: ActorCategory) -> bool {
    matches!(category, ActorCategory::Building | ActorCategory::Vehicle)
}

/// Entry parameter of the segment `origin + t * delta`, `t` in `[0, 1]`,
/// into an axis-aligned box centered at the origin with half-sizes `extent`.
///
/// Returns `None` when the segment misses the box or starts inside it.
fn segment_box_entry(origin: &Point3<f64>, delta: &Vector3<f64>, extent: &Vector3<f64>) -> Option<f64> {
    let mut t_enter = f64::NEG_INFINITY;
    let mut t_exit = f64::INFINITY;

    for axis in 0..3 {
        let o = origin[axis];
        let d = delta[axis];
        let e = extent[axis];
        if d.abs() < 1e-12 {
            if o < -e || o > e {
                return None;
            }
            continue;
        }
        let (t0, t1) = ((-e - o) / d, (e - o) / d);
        let (near, far) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
        t_enter = t_enter.max(near);
        t_exit = t_exit.min(far);
        if t_enter > t_exit {
            return None;
        }
    }

    // Starting inside the box is not an occlusion.
    (t_enter > 0.0 && t_enter <= 1.0 && t_exit >= t_enter).then_some(t_enter)
}

/// Distance along the ray, as a fraction of the camera-target segment, at
/// which it enters `actor`'s bounding box.
pub fn ray_hit(from: &Point3<f64>, to: &Point3<f64>, actor: &ActorSnapshot) -> Option<f64> {
    let frame: Transform = actor.transform.compose(&actor.bounding_box.local_transform());
    let inverse = frame.inverse_matrix();
    let a = inverse.transform_point(from);
    let b = inverse.transform_point(to);
    segment_box_entry(&a, &(b - a), &actor.bounding_box.extent.to_vector())
}

/// Whether an opaque actor sits between the camera and `target`.
///
/// `others` should not contain the target itself or the vehicle carrying the
/// camera.
pub fn is_occluded(target: &Point3<f64>, camera_pose: &Transform, others: &[ActorSnapshot]) -> bool {
    let camera = camera_pose.location.to_point();
    others
        .iter()
        .filter(|actor| is_opaque(actor.category))
        .filter_map(|actor| ray_hit(&camera, target, actor))
        .any(|t| t < 1.0 - 1e-9)
}
