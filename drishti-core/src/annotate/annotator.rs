//! Per-frame traffic light annotation.

use nalgebra::Point3;

use super::types::{Annotation2D, Category};
use crate::camera::{CameraCalibration, Frustum, PixelRect, is_occluded, project_corners, to_camera};
use crate::core::{ActorId, BoundingBox, Transform};
use crate::sim::{ActorCategory, ActorSnapshot, TrafficLight};

/// Turns one world snapshot into 2D boxes for one camera.
#[derive(Clone, Debug)]
pub struct Annotator {
    calibration: CameraCalibration,
    frustum: Frustum,
    near: f64,
}

/// A signal head or whole light in world coordinates.
struct Target {
    corners: [Point3<f64>; 8],
    center: Point3<f64>,
}

impl Target {
    fn new(bbox: &BoundingBox, actor: &Transform) -> Self {
        Self {
            corners: bbox.world_vertices(actor),
            center: bbox.world_center(actor),
        }
    }
}

impl Annotator {
    pub fn new(calibration: CameraCalibration, near: f64) -> Self {
        let frustum = Frustum::new(&calibration, near);
        Self {
            calibration,
            frustum,
            near,
        }
    }

    pub fn calibration(&self) -> &CameraCalibration {
        &self.calibration
    }

    /// Boxes for every visible signal head.
    ///
    /// `actors` is the full actor list of the same tick; `ego` is left out of
    /// the occlusion test since it carries the camera.
    pub fn annotate(
        &self,
        camera_pose: &Transform,
        lights: &[TrafficLight],
        actors: &[ActorSnapshot],
        ego: Option<ActorId>,
    ) -> Vec<Annotation2D> {
        let blockers: Vec<ActorSnapshot> = actors
            .iter()
            .filter(|a| Some(a.id) != ego && a.category != ActorCategory::TrafficLight)
            .cloned()
            .collect();

        let mut annotations = Vec::new();
        for light in lights {
            let category = Category::from_signal(light.state);
            for target in Self::targets(light) {
                if let Some(rect) = self.annotate_target(&target, camera_pose, &blockers) {
                    annotations.push(Annotation2D {
                        category,
                        rect,
                        actor: light.id,
                    });
                }
            }
        }
        annotations
    }

    fn targets(light: &TrafficLight) -> Vec<Target> {
        if light.light_boxes.is_empty() {
            return vec![Target::new(&light.bounding_box, &light.transform)];
        }
        // Head boxes are already in world coordinates.
        light
            .light_boxes
            .iter()
            .map(|head| Target::new(head, &Transform::identity()))
            .collect()
    }

    fn annotate_target(
        &self,
        target: &Target,
        camera_pose: &Transform,
        blockers: &[ActorSnapshot],
    ) -> Option<PixelRect> {
        let corners = target.corners.map(|c| to_camera(&c, camera_pose));
        if self.frustum.culls(&corners) {
            return None;
        }

        let (width, height) = (self.calibration.width(), self.calibration.height());
        let Some(clipped) = project_corners(&corners, self.calibration.intrinsics(), self.near)
            .and_then(|b| b.clip(width, height))
        else {
            tracing::trace!("Target projects outside the image");
            return None;
        };

        if is_occluded(&target.center, camera_pose, blockers) {
            tracing::trace!(
                x = target.center.x,
                y = target.center.y,
                "Target occluded"
            );
            return None;
        }
        clipped.to_pixels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Location, Rotation};
    use crate::sim::SignalState;

    fn annotator() -> Annotator {
        let calibration =
            CameraCalibration::new(1920, 1080, 90.0, Transform::identity()).unwrap();
        Annotator::new(calibration, 0.01)
    }

    fn light(at: Location, heads: Vec<BoundingBox>) -> TrafficLight {
        TrafficLight {
            id: 7,
            transform: Transform::new(at, Rotation::from_yaw(180.0)),
            bounding_box: BoundingBox::axis_aligned(
                Location::new(0.0, 0.0, 0.0),
                Location::new(0.2, 0.35, 0.55),
            ),
            light_boxes: heads,
            state: SignalState::Green,
        }
    }

    #[test]
    fn test_light_ahead_is_centered() {
        let lights = [light(Location::new(10.0, 0.0, 0.0), Vec::new())];
        let boxes = annotator().annotate(&Transform::identity(), &lights, &[], None);
        assert_eq!(boxes.len(), 1);
        let rect = boxes[0].rect;
        assert_eq!(boxes[0].category, Category::TrafficLightGo);
        let (cx, cy) = (
            (rect.xmin + rect.xmax) as f64 / 2.0,
            (rect.ymin + rect.ymax) as f64 / 2.0,
        );
        assert!((cx - 960.0).abs() < 2.0);
        assert!((cy - 540.0).abs() < 2.0);
        // 0.35 m half width at 9.8 to 10.2 m with focal 960: about 34 px.
        assert!(rect.width() > 60 && rect.width() < 72);
        assert!(rect.height() > 100 && rect.height() < 112);
    }

    #[test]
    fn test_light_behind_has_no_box() {
        let lights = [light(Location::new(-10.0, 0.0, 0.0), Vec::new())];
        assert!(annotator().annotate(&Transform::identity(), &lights, &[], None).is_empty());
    }

    #[test]
    fn test_each_head_annotated() {
        let heads = vec![
            BoundingBox::axis_aligned(Location::new(15.0, -2.0, 1.0), Location::new(0.2, 0.3, 0.5)),
            BoundingBox::axis_aligned(Location::new(15.0, 2.0, 1.0), Location::new(0.2, 0.3, 0.5)),
        ];
        let lights = [light(Location::new(15.0, 0.0, -4.0), heads)];
        let boxes = annotator().annotate(&Transform::identity(), &lights, &[], None);
        assert_eq!(boxes.len(), 2);
        // +y is right in the simulator frame.
        assert!(boxes[0].rect.xmax < boxes[1].rect.xmin);
    }

    #[test]
    fn test_building_hides_light_but_ego_does_not() {
        let lights = [light(Location::new(20.0, 0.0, 0.0), Vec::new())];
        let wall = ActorSnapshot {
            id: 3,
            category: ActorCategory::Building,
            role: None,
            transform: Transform::new(Location::new(10.0, 0.0, 0.0), Rotation::default()),
            bounding_box: BoundingBox::axis_aligned(Location::ZERO, Location::new(1.0, 10.0, 10.0)),
        };
        let a = annotator();
        assert!(a.annotate(&Transform::identity(), &lights, &[wall.clone()], None).is_empty());
        let mut ego = wall;
        ego.category = ActorCategory::Vehicle;
        assert_eq!(
            a.annotate(&Transform::identity(), &lights, &[ego.clone()], Some(ego.id)).len(),
            1
        );
    }
}
