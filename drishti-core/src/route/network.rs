//! Road network as exposed by the simulator map.
//!
//! A [`RoadNetwork`] is a flat list of directed lane segments. Each segment is
//! a densely sampled polyline of [`Waypoint`]s running in the driving
//! direction. Segments meet where the exit of one lies on the entry of another;
//! the planner recovers connectivity from positions, so successor relations
//! never need to be stored explicitly.

use serde::{Deserialize, Serialize};

use crate::core::{Location, Transform};
use crate::core::math::normalize_degrees;

/// Waypoint identifier, unique within one map query.
pub type WaypointId = u64;

/// Index of a segment in [`RoadNetwork::segments`].
pub type SegmentId = usize;

/// Lane changes the road markings permit at a waypoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaneChange {
    #[default]
    None,
    Left,
    Right,
    Both,
}

impl LaneChange {
    pub fn allows_left(self) -> bool {
        matches!(self, LaneChange::Left | LaneChange::Both)
    }

    pub fn allows_right(self) -> bool {
        matches!(self, LaneChange::Right | LaneChange::Both)
    }
}

/// A sampled point on a lane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: WaypointId,
    pub transform: Transform,
    pub road_id: i32,
    pub section_id: i32,
    pub lane_id: i32,
    /// Distance along the road in meters.
    pub s: f64,
    pub lane_width: f64,
    pub is_junction: bool,
    pub lane_change: LaneChange,
}

impl Waypoint {
    #[inline]
    pub fn location(&self) -> Location {
        self.transform.location
    }

    #[inline]
    pub fn yaw(&self) -> f64 {
        self.transform.rotation.yaw
    }

    /// True when both lie on the same lane within `epsilon` meters.
    pub fn same_as(&self, other: &Waypoint, epsilon: f64) -> bool {
        self.road_id == other.road_id
            && self.section_id == other.section_id
            && self.lane_id == other.lane_id
            && self.location().distance(&other.location()) <= epsilon
    }
}

/// One directed lane between two consecutive branch points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneSegment {
    /// Samples in driving order, entry first. Always at least two.
    pub path: Vec<Waypoint>,
}

impl LaneSegment {
    pub fn new(path: Vec<Waypoint>) -> Self {
        Self { path }
    }

    #[inline]
    pub fn entry(&self) -> &Waypoint {
        &self.path[0]
    }

    #[inline]
    pub fn exit(&self) -> &Waypoint {
        &self.path[self.path.len() - 1]
    }

    pub fn is_junction(&self) -> bool {
        self.path.iter().any(|wp| wp.is_junction)
    }

    /// Polyline length in meters.
    pub fn length(&self) -> f64 {
        self.path
            .windows(2)
            .map(|w| w[0].location().distance(&w[1].location()))
            .sum()
    }

    /// Heading change from entry to exit, in degrees. Positive turns right.
    pub fn heading_change(&self) -> f64 {
        normalize_degrees(self.exit().yaw() - self.entry().yaw())
    }
}

/// Side of a lane change, seen in the driving direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Permitted move from one lane to its same-direction neighbor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneChangeLink {
    pub from: SegmentId,
    pub to: SegmentId,
    pub side: Side,
}

/// Everything the planner needs to know about a town.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoadNetwork {
    pub segments: Vec<LaneSegment>,
    pub lane_changes: Vec<LaneChangeLink>,
}

impl RoadNetwork {
    pub fn new(segments: Vec<LaneSegment>, lane_changes: Vec<LaneChangeLink>) -> Self {
        Self {
            segments,
            lane_changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of all segment lengths in meters.
    pub fn total_length(&self) -> f64 {
        self.segments.iter().map(LaneSegment::length).sum()
    }

    /// Segment containing a waypoint equal to `waypoint`.
    ///
    /// A waypoint shared by an exit and the following entry resolves to the
    /// segment it starts.
    pub fn locate(&self, waypoint: &Waypoint, epsilon: f64) -> Option<SegmentId> {
        let matches = |seg: &LaneSegment, upto: usize| {
            seg.path[..upto].iter().any(|wp| wp.same_as(waypoint, epsilon))
        };
        self.segments
            .iter()
            .position(|seg| matches(seg, seg.path.len().saturating_sub(1)))
            .or_else(|| self.segments.iter().position(|seg| matches(seg, seg.path.len())))
    }

    /// Waypoint nearest to `location`, ignoring lane identity.
    pub fn closest_waypoint(&self, location: &Location) -> Option<&Waypoint> {
        self.segments
            .iter()
            .flat_map(|seg| seg.path.iter())
            .min_by(|a, b| {
                let da = a.location().distance(location);
                let db = b.location().distance(location);
                da.total_cmp(&db)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Rotation;
    use approx::assert_relative_eq;

    fn wp(id: u64, x: f64, y: f64, yaw: f64) -> Waypoint {
        Waypoint {
            id,
            transform: Transform::new(Location::new(x, y, 0.0), Rotation::from_yaw(yaw)),
            road_id: 1,
            section_id: 0,
            lane_id: -1,
            s: x,
            lane_width: 3.5,
            is_junction: false,
            lane_change: LaneChange::None,
        }
    }

    #[test]
    fn test_segment_length_and_heading() {
        let seg = LaneSegment::new(vec![wp(0, 0.0, 0.0, 0.0), wp(1, 3.0, 4.0, 90.0)]);
        assert_relative_eq!(seg.length(), 5.0);
        assert_relative_eq!(seg.heading_change(), 90.0);
    }

    #[test]
    fn test_same_as_requires_same_lane() {
        let a = wp(0, 0.0, 0.0, 0.0);
        let mut b = wp(1, 0.05, 0.0, 0.0);
        assert!(a.same_as(&b, 0.1));
        b.lane_id = -2;
        assert!(!a.same_as(&b, 0.1));
    }

    #[test]
    fn test_locate_and_closest() {
        let network = RoadNetwork::new(
            vec![
                LaneSegment::new(vec![wp(0, 0.0, 0.0, 0.0), wp(1, 2.0, 0.0, 0.0)]),
                LaneSegment::new(vec![wp(2, 2.0, 0.0, 0.0), wp(3, 4.0, 0.0, 0.0)]),
            ],
            Vec::new(),
        );
        assert_eq!(network.locate(&wp(9, 4.0, 0.0, 0.0), 0.1), Some(1));
        let near = network.closest_waypoint(&Location::new(0.4, 0.3, 0.0));
        assert_eq!(near.map(|w| w.id), Some(0));
    }
}
