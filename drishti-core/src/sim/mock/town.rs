//! Procedural grid towns for the mock simulator.
//!
//! A town is a rectangular grid of intersections joined by two-way roads.
//! Every road carries `lanes_per_direction` lanes each way, driven on the
//! right. Intersections connect each incoming lane to the same lane index of
//! every other road (no U-turns, except at dead ends). Intersections with
//! three or more roads get one traffic light per approach.
//!
//! ```text
//!   (0,0)────(1,0)────(2,0)        x grows to the right (east)
//!     │  ████  │  ████  │          y grows downward (south)
//!   (0,1)────(1,1)────(2,1)        ████ buildings fill the blocks
//!     │  ████  │  ████  │
//!   (0,2)────(1,2)────(2,2)
//! ```

use nalgebra::Vector2;

use crate::core::math::normalize_degrees;
use crate::core::{ActorId, BoundingBox, Location, Rotation, Transform};
use crate::route::{LaneChange, LaneChangeLink, LaneSegment, RoadNetwork, Side, Waypoint};
use crate::sim::{ActorCategory, ActorSnapshot, SignalState};

/// Seconds of green, yellow and full cycle for the signal plan.
const GREEN_SECS: f64 = 10.0;
const YELLOW_SECS: f64 = 3.0;
const CYCLE_SECS: f64 = 2.0 * (GREEN_SECS + YELLOW_SECS);

/// First actor id handed to static town actors.
pub const TOWN_ACTOR_BASE: ActorId = 1_000;

/// Grid layout parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GridSpec {
    pub name: String,
    pub columns: usize,
    pub rows: usize,
    /// Distance between neighboring intersection centers (meters).
    pub block_size: f64,
    pub lanes_per_direction: usize,
    pub lane_width: f64,
    /// Radius of the junction area around each intersection center.
    pub intersection_radius: f64,
    /// Add a disconnected 2x2 loop east of the grid.
    pub island: bool,
}

impl GridSpec {
    /// Built-in layouts for the named towns.
    pub fn for_town(name: &str) -> Option<GridSpec> {
        let base = |columns, rows, block_size, lanes, island| GridSpec {
            name: name.to_string(),
            columns,
            rows,
            block_size,
            lanes_per_direction: lanes,
            lane_width: 3.5,
            intersection_radius: 8.0,
            island,
        };
        match name {
            "Town01" => Some(base(3, 3, 60.0, 1, false)),
            "Town02" => Some(base(3, 2, 50.0, 1, false)),
            "Town10HD" => Some(base(3, 3, 70.0, 2, true)),
            _ => None,
        }
    }
}

/// One approach into an intersection, used to place signals.
#[derive(Clone, Copy, Debug)]
struct Approach {
    center: Vector2<f64>,
    /// Driving direction toward the center.
    dir: Vector2<f64>,
    /// 0 for roads along X, 1 for roads along Y.
    axis: usize,
    /// Seconds added to the global clock for this intersection.
    phase_offset: f64,
}

/// Static traffic light description.
#[derive(Clone, Debug, PartialEq)]
pub struct TownLight {
    pub id: ActorId,
    pub transform: Transform,
    pub bounding_box: BoundingBox,
    pub light_boxes: Vec<BoundingBox>,
    axis: usize,
    phase_offset: f64,
}

impl TownLight {
    /// Signal shown at `elapsed` seconds of simulation time.
    pub fn state_at(&self, elapsed: f64) -> SignalState {
        let t = (elapsed + self.phase_offset).rem_euclid(CYCLE_SECS);
        // Axis 0 leads, axis 1 runs half a cycle later.
        let local = if self.axis == 0 {
            t
        } else {
            (t + CYCLE_SECS / 2.0).rem_euclid(CYCLE_SECS)
        };
        if local < GREEN_SECS {
            SignalState::Green
        } else if local < GREEN_SECS + YELLOW_SECS {
            SignalState::Yellow
        } else {
            SignalState::Red
        }
    }
}

/// Generated town: lanes, signals and static props.
#[derive(Clone, Debug)]
pub struct MockTown {
    pub spec: GridSpec,
    pub network: RoadNetwork,
    pub lights: Vec<TownLight>,
    pub props: Vec<ActorSnapshot>,
}

fn yaw_of(dir: &Vector2<f64>) -> f64 {
    dir.y.atan2(dir.x).to_degrees()
}

fn right_of(dir: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-dir.y, dir.x)
}

fn loc(p: &Vector2<f64>, z: f64) -> Location {
    Location::new(p.x, p.y, z)
}

struct Builder<'a> {
    spec: &'a GridSpec,
    sampling: f64,
    segments: Vec<LaneSegment>,
    lane_changes: Vec<LaneChangeLink>,
    next_waypoint: u64,
    next_junction_road: i32,
}

impl Builder<'_> {
    #[allow(clippy::too_many_arguments)]
    fn waypoint(
        &mut self,
        p: Vector2<f64>,
        yaw: f64,
        road_id: i32,
        lane_id: i32,
        s: f64,
        is_junction: bool,
        lane_change: LaneChange,
    ) -> Waypoint {
        let id = self.next_waypoint;
        self.next_waypoint += 1;
        Waypoint {
            id,
            transform: Transform::new(loc(&p, 0.0), Rotation::from_yaw(normalize_degrees(yaw))),
            road_id,
            section_id: 0,
            lane_id,
            s,
            lane_width: self.spec.lane_width,
            is_junction,
            lane_change,
        }
    }

    fn lane_change_for(&self, lane: usize) -> LaneChange {
        let last = self.spec.lanes_per_direction.saturating_sub(1);
        match (lane, last) {
            (_, 0) => LaneChange::None,
            (0, _) => LaneChange::Right,
            (l, m) if l == m => LaneChange::Left,
            _ => LaneChange::Both,
        }
    }

    /// Straight lane from `a` to `b`, trimmed by the junction radius.
    fn road_lane(
        &mut self,
        a: Vector2<f64>,
        b: Vector2<f64>,
        road_id: i32,
        lane_id: i32,
        lane: usize,
    ) -> usize {
        let dir = (b - a).normalize();
        let offset = right_of(&dir) * ((lane as f64 + 0.5) * self.spec.lane_width);
        let start = a + dir * self.spec.intersection_radius + offset;
        let end = b - dir * self.spec.intersection_radius + offset;
        let length = (end - start).norm();
        let n = ((length / self.sampling).ceil() as usize).max(1);
        let yaw = yaw_of(&dir);
        let lane_change = self.lane_change_for(lane);

        let path = (0..=n)
            .map(|i| {
                let t = i as f64 / n as f64;
                let p = start + (end - start) * t;
                self.waypoint(p, yaw, road_id, lane_id, t * length, false, lane_change)
            })
            .collect();
        self.segments.push(LaneSegment::new(path));
        self.segments.len() - 1
    }

    /// Quadratic curve through the junction from one lane exit to a lane entry.
    fn junction_lane(&mut self, entry: Vector2<f64>, exit: Vector2<f64>, control: Vector2<f64>) {
        let road_id = self.next_junction_road;
        self.next_junction_road += 1;
        let approx_len = (control - entry).norm() + (exit - control).norm();
        let n = ((approx_len / self.sampling).ceil() as usize).max(2);

        let mut s = 0.0;
        let mut prev = entry;
        let path = (0..=n)
            .map(|i| {
                let t = i as f64 / n as f64;
                let p = entry * (1.0 - t).powi(2) + control * (2.0 * (1.0 - t) * t) + exit * t.powi(2);
                let tangent = (control - entry) * (2.0 * (1.0 - t)) + (exit - control) * (2.0 * t);
                s += (p - prev).norm();
                prev = p;
                self.waypoint(p, yaw_of(&tangent), road_id, -1, s, true, LaneChange::None)
            })
            .collect();
        self.segments.push(LaneSegment::new(path));
    }
}

impl MockTown {
    /// Generate the town described by `spec`, sampling lanes every `sampling` meters.
    pub fn generate(spec: &GridSpec, sampling: f64) -> MockTown {
        let mut builder = Builder {
            spec,
            sampling: sampling.max(0.1),
            segments: Vec::new(),
            lane_changes: Vec::new(),
            next_waypoint: 0,
            next_junction_road: 1_000,
        };
        let mut lights = Vec::new();
        let mut props = Vec::new();
        let mut next_actor = TOWN_ACTOR_BASE;

        let mut road_id = 0;
        Self::add_grid(
            &mut builder,
            spec.columns,
            spec.rows,
            Vector2::zeros(),
            &mut road_id,
            &mut lights,
            &mut props,
            &mut next_actor,
        );
        if spec.island {
            let origin = Vector2::new(spec.columns as f64 * spec.block_size + 1_000.0, 0.0);
            Self::add_grid(
                &mut builder,
                2,
                2,
                origin,
                &mut road_id,
                &mut lights,
                &mut props,
                &mut next_actor,
            );
        }

        MockTown {
            spec: spec.clone(),
            network: RoadNetwork::new(builder.segments, builder.lane_changes),
            lights,
            props,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_grid(
        builder: &mut Builder<'_>,
        columns: usize,
        rows: usize,
        origin: Vector2<f64>,
        road_id: &mut i32,
        lights: &mut Vec<TownLight>,
        props: &mut Vec<ActorSnapshot>,
        next_actor: &mut ActorId,
    ) {
        let spec = builder.spec;
        let center = |i: usize, j: usize| {
            origin + Vector2::new(i as f64 * spec.block_size, j as f64 * spec.block_size)
        };

        // Roads as pairs of grid coordinates.
        let mut roads = Vec::new();
        for j in 0..rows {
            for i in 0..columns {
                if i + 1 < columns {
                    roads.push(((i, j), (i + 1, j)));
                }
                if j + 1 < rows {
                    roads.push(((i, j), (i, j + 1)));
                }
            }
        }

        for &(a, b) in &roads {
            *road_id += 1;
            let (pa, pb) = (center(a.0, a.1), center(b.0, b.1));
            for (from, to, sign) in [(pa, pb, -1), (pb, pa, 1)] {
                let ids: Vec<usize> = (0..spec.lanes_per_direction)
                    .map(|lane| builder.road_lane(from, to, *road_id, sign * (lane as i32 + 1), lane))
                    .collect();
                for pair in ids.windows(2) {
                    builder.lane_changes.push(LaneChangeLink {
                        from: pair[0],
                        to: pair[1],
                        side: Side::Right,
                    });
                    builder.lane_changes.push(LaneChangeLink {
                        from: pair[1],
                        to: pair[0],
                        side: Side::Left,
                    });
                }
            }
        }

        for j in 0..rows {
            for i in 0..columns {
                let c = center(i, j);
                // Unit directions of roads leaving this intersection.
                let exits: Vec<Vector2<f64>> = roads
                    .iter()
                    .filter_map(|&(a, b)| {
                        if a == (i, j) {
                            Some((center(b.0, b.1) - c).normalize())
                        } else if b == (i, j) {
                            Some((center(a.0, a.1) - c).normalize())
                        } else {
                            None
                        }
                    })
                    .collect();
                let dead_end = exits.len() == 1;

                for &toward in &exits {
                    // Traffic arriving along this road drives against `toward`.
                    let d_in = -toward;
                    let r_in = right_of(&d_in);
                    for &d_out in &exits {
                        let u_turn = (d_out + d_in).norm() < 1e-6;
                        if u_turn && !dead_end {
                            continue;
                        }
                        let r_out = right_of(&d_out);
                        for lane in 0..spec.lanes_per_direction {
                            let off = (lane as f64 + 0.5) * spec.lane_width;
                            let entry = c - d_in * spec.intersection_radius + r_in * off;
                            let exit = c + d_out * spec.intersection_radius + r_out * off;
                            let control = if u_turn {
                                c + d_in * spec.intersection_radius
                            } else if d_in.dot(&d_out) > 0.5 {
                                (entry + exit) * 0.5
                            } else {
                                entry + d_in * (exit - entry).dot(&d_in)
                            };
                            builder.junction_lane(entry, exit, control);
                        }
                    }

                    if exits.len() >= 3 {
                        let approach = Approach {
                            center: c,
                            dir: d_in,
                            axis: usize::from(d_in.x.abs() < 0.5),
                            phase_offset: ((i + j) % 4) as f64 * 7.0,
                        };
                        lights.push(Self::light(spec, &approach, *next_actor));
                        *next_actor += 1;
                    }
                }
            }
        }

        // Buildings fill block interiors, trees line the block corners.
        for j in 0..rows.saturating_sub(1) {
            for i in 0..columns.saturating_sub(1) {
                let c = center(i, j) + Vector2::new(spec.block_size, spec.block_size) * 0.5;
                let half = spec.block_size / 2.0 - spec.intersection_radius - 6.0;
                let height = 8.0 + ((i * 7 + j * 13) % 5) as f64 * 4.0;
                props.push(ActorSnapshot {
                    id: *next_actor,
                    category: ActorCategory::Building,
                    role: None,
                    transform: Transform::new(loc(&c, 0.0), Rotation::default()),
                    bounding_box: BoundingBox::axis_aligned(
                        Location::new(0.0, 0.0, height / 2.0),
                        Location::new(half, half, height / 2.0),
                    ),
                });
                *next_actor += 1;

                let corner = c - Vector2::new(half + 2.0, half + 2.0);
                props.push(ActorSnapshot {
                    id: *next_actor,
                    category: ActorCategory::Vegetation,
                    role: None,
                    transform: Transform::new(loc(&corner, 0.0), Rotation::default()),
                    bounding_box: BoundingBox::axis_aligned(
                        Location::new(0.0, 0.0, 3.0),
                        Location::new(1.5, 1.5, 3.0),
                    ),
                });
                *next_actor += 1;
            }
        }
    }

    fn light(spec: &GridSpec, approach: &Approach, id: ActorId) -> TownLight {
        let d_in = approach.dir;
        let r_in = right_of(&d_in);
        let stop = approach.center - d_in * (spec.intersection_radius + 0.5);
        let road_half = spec.lanes_per_direction as f64 * spec.lane_width;
        let pole = stop + r_in * (road_half + 1.0);
        // Heads face the approaching traffic.
        let facing = Rotation::from_yaw(normalize_degrees(yaw_of(&d_in) + 180.0));
        let head_extent = Location::new(0.2, 0.35, 0.55);

        let mut light_boxes = vec![BoundingBox::new(loc(&pole, 3.0), head_extent, facing)];
        for lane in 0..spec.lanes_per_direction {
            let over = stop + r_in * ((lane as f64 + 0.5) * spec.lane_width);
            light_boxes.push(BoundingBox::new(loc(&over, 5.2), head_extent, facing));
        }

        TownLight {
            id,
            transform: Transform::new(loc(&pole, 0.0), facing),
            bounding_box: BoundingBox::axis_aligned(
                Location::new(0.0, 0.0, 2.5),
                Location::new(0.15, 0.15, 2.5),
            ),
            light_boxes,
            axis: approach.axis,
            phase_offset: approach.phase_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::LaneGraph;

    fn town(name: &str) -> MockTown {
        let spec = GridSpec::for_town(name).unwrap();
        MockTown::generate(&spec, 2.0)
    }

    #[test]
    fn test_unknown_town() {
        assert!(GridSpec::for_town("Atlantis").is_none());
    }

    #[test]
    fn test_grid_lane_counts() {
        let town = town("Town01");
        // 12 roads x 2 directions plus junction connectors.
        let roads = town
            .network
            .segments
            .iter()
            .filter(|s| !s.is_junction())
            .count();
        assert_eq!(roads, 24);
        // Corners: 2 turns each; edges: 6; center: 12.
        let junctions = town.network.segments.len() - roads;
        assert_eq!(junctions, 4 * 2 + 4 * 6 + 12);
    }

    #[test]
    fn test_grid_lanes_meet_junction_connectors() {
        let town = town("Town01");
        let graph = LaneGraph::build(&town.network, 0.1);
        // Lane ends merge with connector ends, so the grid is one piece.
        let (_, components) = graph.components();
        assert_eq!(components, 1);
        // A lane feeding a 4-way intersection branches into 3 connectors.
        let branching = graph.outgoing.iter().filter(|out| out.len() == 3).count();
        assert_eq!(branching, 4);
    }

    #[test]
    fn test_island_is_separate_component() {
        let town = town("Town10HD");
        let graph = LaneGraph::build(&town.network, 0.1);
        let (_, components) = graph.components();
        assert_eq!(components, 2);
        assert!(!town.network.lane_changes.is_empty());
    }

    #[test]
    fn test_lights_only_at_branching_intersections() {
        let town = town("Town01");
        // 4 edge intersections x 3 approaches + center x 4.
        assert_eq!(town.lights.len(), 16);
        for light in &town.lights {
            assert_eq!(light.light_boxes.len(), 2);
        }
    }

    #[test]
    fn test_signal_cycle() {
        let town = town("Town01");
        let light = &town.lights[0];
        let states: Vec<_> = (0..26).map(|s| light.state_at(s as f64)).collect();
        assert!(states.contains(&SignalState::Green));
        assert!(states.contains(&SignalState::Yellow));
        assert!(states.contains(&SignalState::Red));
        assert_eq!(light.state_at(3.0), light.state_at(3.0 + CYCLE_SECS));
    }
}
