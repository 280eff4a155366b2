//! Full-coverage route planning.
//!
//! The lane graph is made Eulerian per connected component by adding the
//! cheapest deadhead walks between unbalanced vertices, then one Euler
//! circuit per component is converted back into waypoints. Components are
//! concatenated with a respawn in between.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::balance::transport;
use super::dijkstra::shortest_paths;
use super::euler::euler_circuit;
use super::graph::{EdgeKind, EdgeSource, LaneGraph, NodeId, cost_mm};
use super::network::{RoadNetwork, SegmentId, Side, Waypoint};
use crate::error::{DrishtiError, Result};

/// Planner settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Spacing of map waypoints in meters (default: 2.0)
    #[serde(default = "default_sampling_resolution")]
    pub sampling_resolution: f64,

    /// Endpoints closer than this are the same vertex, in meters (default: 0.1)
    #[serde(default = "default_node_merge_epsilon")]
    pub node_merge_epsilon: f64,

    /// Heading change below which a junction crossing is straight (default: 35)
    #[serde(default = "default_turn_threshold")]
    pub turn_threshold_degrees: f64,

    /// Cost charged for respawning between unconnected vertices (default: 10 km)
    #[serde(default = "default_teleport_penalty")]
    pub teleport_penalty_m: f64,
}

fn default_sampling_resolution() -> f64 {
    2.0
}
fn default_node_merge_epsilon() -> f64 {
    0.1
}
fn default_turn_threshold() -> f64 {
    35.0
}
fn default_teleport_penalty() -> f64 {
    10_000.0
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            sampling_resolution: default_sampling_resolution(),
            node_merge_epsilon: default_node_merge_epsilon(),
            turn_threshold_degrees: default_turn_threshold(),
            teleport_penalty_m: default_teleport_penalty(),
        }
    }
}

/// High-level maneuver attached to each route waypoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadOption {
    #[default]
    LaneFollow,
    Left,
    Right,
    Straight,
    ChangeLaneLeft,
    ChangeLaneRight,
}

/// One waypoint of a planned route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteWaypoint {
    pub waypoint: Waypoint,
    pub option: RoadOption,
    /// Segment the waypoint was taken from.
    pub segment: SegmentId,
    pub kind: EdgeKind,
}

/// One traversed edge of a planned route.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteEdge {
    pub kind: EdgeKind,
    /// Lane segment driven, `None` for lane changes and teleports.
    pub segment: Option<SegmentId>,
    pub from: NodeId,
    pub to: NodeId,
    pub length_m: f64,
}

/// Continuous stretch of driving.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    /// The vehicle must be placed at the first waypoint before driving.
    pub respawn: bool,
    pub edges: Vec<RouteEdge>,
    pub waypoints: Vec<RouteWaypoint>,
}

/// Route statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub components: usize,
    pub required_edges: usize,
    pub required_length_m: f64,
    pub deadhead_edges: usize,
    pub deadhead_length_m: f64,
    pub lane_changes: usize,
    pub respawns: usize,
    pub waypoints: usize,
}

/// Planned coverage route.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub legs: Vec<RouteLeg>,
    pub report: CoverageReport,
}

impl Route {
    /// All waypoints in driving order.
    pub fn waypoints(&self) -> impl Iterator<Item = &RouteWaypoint> {
        self.legs.iter().flat_map(|leg| leg.waypoints.iter())
    }

    /// All edges in driving order.
    pub fn edges(&self) -> impl Iterator<Item = &RouteEdge> {
        self.legs.iter().flat_map(|leg| leg.edges.iter())
    }

    pub fn waypoint_count(&self) -> usize {
        self.legs.iter().map(|leg| leg.waypoints.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoint_count() == 0
    }

    /// Segments driven along their full length.
    pub fn covered_segments(&self) -> HashSet<SegmentId> {
        self.edges().filter_map(|e| e.segment).collect()
    }
}

/// Edge of the augmented multigraph.
#[derive(Clone, Copy, Debug)]
struct PlanEdge {
    from: NodeId,
    to: NodeId,
    kind: EdgeKind,
    source: Option<EdgeSource>,
}

/// Coverage route planner.
#[derive(Clone, Debug, Default)]
pub struct CoveragePlanner {
    config: PlannerConfig,
}

impl CoveragePlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan a route that drives every lane segment at least once.
    ///
    /// Starts at the segment containing `start` (or segment 0). Fails when the
    /// network is empty or `start` lies on no lane.
    pub fn plan(&self, network: &RoadNetwork, start: Option<&Waypoint>) -> Result<Route> {
        if network.is_empty() {
            return Err(DrishtiError::RoutePlanning(
                "road network has no lane segments".to_string(),
            ));
        }
        if let Some(id) = network.segments.iter().position(|s| s.path.len() < 2) {
            return Err(DrishtiError::RoutePlanning(format!(
                "lane segment {} has fewer than two waypoints",
                id
            )));
        }

        let start_segment = match start {
            Some(wp) => network
                .locate(wp, self.config.node_merge_epsilon)
                .ok_or_else(|| {
                    DrishtiError::RoutePlanning(format!(
                        "start waypoint {} (road {}, lane {}) is not on the road network",
                        wp.id, wp.road_id, wp.lane_id
                    ))
                })?,
            None => 0,
        };

        let graph = LaneGraph::build(network, self.config.node_merge_epsilon);
        let (labels, component_count) = graph.components();
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edges.len(),
            components = component_count,
            "Lane graph built"
        );

        let mut plan_edges: Vec<PlanEdge> = graph
            .edges
            .iter()
            .filter(|e| e.is_required())
            .map(|e| PlanEdge {
                from: e.from,
                to: e.to,
                kind: EdgeKind::Required,
                source: Some(e.source),
            })
            .collect();

        self.add_balancing_edges(&graph, &labels, &mut plan_edges);

        // Start component first, the rest in label order.
        let start_label = labels[graph.segment_nodes[start_segment].0].unwrap_or(0);
        let order = std::iter::once(start_label)
            .chain((0..component_count).filter(|&c| c != start_label));

        let mut legs = Vec::new();
        for label in order {
            let first_segment = if label == start_label {
                start_segment
            } else {
                match graph
                    .segment_nodes
                    .iter()
                    .position(|&(from, _)| labels[from] == Some(label))
                {
                    Some(id) => id,
                    None => continue,
                }
            };

            let circuit = self.component_circuit(&graph, &labels, label, first_segment, &plan_edges)?;
            let respawn = !legs.is_empty();
            self.split_into_legs(network, &graph, &plan_edges, &circuit, respawn, &mut legs);
        }

        let route = finish_route(legs, component_count);
        tracing::info!(
            segments = network.segments.len(),
            required_m = route.report.required_length_m.round(),
            deadhead_m = route.report.deadhead_length_m.round(),
            respawns = route.report.respawns,
            waypoints = route.report.waypoints,
            "Coverage route planned"
        );
        Ok(route)
    }

    /// Add deadhead walks (or teleports) until every vertex is balanced.
    fn add_balancing_edges(
        &self,
        graph: &LaneGraph,
        labels: &[Option<usize>],
        plan_edges: &mut Vec<PlanEdge>,
    ) {
        let delta = graph.imbalance();
        let adjacency = graph.adjacency();
        let penalty = cost_mm(self.config.teleport_penalty_m);

        let component_count = labels.iter().flatten().max().map_or(0, |&m| m + 1);
        for label in 0..component_count {
            let in_component = |n: &usize| labels[*n] == Some(label);
            let surplus: Vec<NodeId> = (0..graph.node_count())
                .filter(|n| in_component(n) && delta[*n] > 0)
                .collect();
            let deficit: Vec<NodeId> = (0..graph.node_count())
                .filter(|n| in_component(n) && delta[*n] < 0)
                .collect();
            if surplus.is_empty() {
                continue;
            }

            let trees: Vec<_> = surplus
                .iter()
                .map(|&s| shortest_paths(&adjacency, s))
                .collect();
            let cost: Vec<Vec<u64>> = trees
                .iter()
                .map(|tree| {
                    deficit
                        .iter()
                        .map(|&d| tree.distance(d).unwrap_or(penalty).min(penalty))
                        .collect()
                })
                .collect();
            let supplies: Vec<u64> = surplus.iter().map(|&n| delta[n] as u64).collect();
            let demands: Vec<u64> = deficit.iter().map(|&n| (-delta[n]) as u64).collect();

            for assignment in transport(&supplies, &demands, &cost) {
                let from = surplus[assignment.supply];
                let to = deficit[assignment.demand];
                let path = trees[assignment.supply]
                    .path_to(to, &graph.edges)
                    .filter(|_| cost[assignment.supply][assignment.demand] < penalty);

                for _ in 0..assignment.units {
                    match &path {
                        Some(edge_ids) => {
                            plan_edges.extend(edge_ids.iter().map(|&e| {
                                let edge = graph.edges[e];
                                PlanEdge {
                                    from: edge.from,
                                    to: edge.to,
                                    kind: match edge.source {
                                        EdgeSource::Segment(_) => EdgeKind::Deadhead,
                                        EdgeSource::LaneChange(_) => EdgeKind::LaneChange,
                                    },
                                    source: Some(edge.source),
                                }
                            }));
                        }
                        None => {
                            tracing::debug!(from, to, "No road path between unbalanced vertices");
                            plan_edges.push(PlanEdge {
                                from,
                                to,
                                kind: EdgeKind::Teleport,
                                source: None,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Euler circuit of one component, rotated to start with `first_segment`
    /// and with trailing non-required edges removed.
    fn component_circuit(
        &self,
        graph: &LaneGraph,
        labels: &[Option<usize>],
        label: usize,
        first_segment: SegmentId,
        plan_edges: &[PlanEdge],
    ) -> Result<Vec<usize>> {
        let members: Vec<usize> = (0..plan_edges.len())
            .filter(|&e| labels[plan_edges[e].from] == Some(label))
            .collect();
        let pairs: Vec<(usize, usize)> = members
            .iter()
            .map(|&e| (plan_edges[e].from, plan_edges[e].to))
            .collect();

        let start_node = graph.segment_nodes[first_segment].0;
        let local = euler_circuit(graph.node_count(), &pairs, start_node).ok_or_else(|| {
            DrishtiError::RoutePlanning(format!(
                "component {} could not be balanced into a circuit",
                label
            ))
        })?;
        let mut circuit: Vec<usize> = local.into_iter().map(|i| members[i]).collect();

        if let Some(pos) = circuit.iter().position(|&e| {
            plan_edges[e].kind == EdgeKind::Required
                && plan_edges[e].source == Some(EdgeSource::Segment(first_segment))
        }) {
            circuit.rotate_left(pos);
        }

        while circuit
            .last()
            .is_some_and(|&e| plan_edges[e].kind != EdgeKind::Required)
        {
            circuit.pop();
        }
        Ok(circuit)
    }

    /// Turn a circuit into legs, breaking at teleports.
    fn split_into_legs(
        &self,
        network: &RoadNetwork,
        graph: &LaneGraph,
        plan_edges: &[PlanEdge],
        circuit: &[usize],
        respawn_first: bool,
        legs: &mut Vec<RouteLeg>,
    ) {
        let mut leg = RouteLeg {
            respawn: respawn_first,
            ..Default::default()
        };

        for &e in circuit {
            let edge = plan_edges[e];
            match (edge.kind, edge.source) {
                (EdgeKind::Teleport, _) | (_, None) => {
                    if !leg.edges.is_empty() {
                        legs.push(std::mem::take(&mut leg));
                    }
                    leg.respawn = true;
                }
                (kind, Some(source)) => {
                    let length_m = match source {
                        EdgeSource::Segment(id) => network.segments[id].length(),
                        EdgeSource::LaneChange(_) => {
                            graph.edges.iter().find(|g| g.source == source).map_or(0.0, |g| {
                                g.cost_mm as f64 / 1000.0
                            })
                        }
                    };
                    leg.edges.push(RouteEdge {
                        kind,
                        segment: match source {
                            EdgeSource::Segment(id) => Some(id),
                            EdgeSource::LaneChange(_) => None,
                        },
                        from: edge.from,
                        to: edge.to,
                        length_m,
                    });
                    self.append_waypoints(network, source, kind, &mut leg.waypoints);
                }
            }
        }

        if !leg.edges.is_empty() {
            legs.push(leg);
        }
    }

    fn append_waypoints(
        &self,
        network: &RoadNetwork,
        source: EdgeSource,
        kind: EdgeKind,
        out: &mut Vec<RouteWaypoint>,
    ) {
        let eps = self.config.node_merge_epsilon;
        let push = |out: &mut Vec<RouteWaypoint>, wp: &Waypoint, option, segment| {
            if out
                .last()
                .is_some_and(|last: &RouteWaypoint| last.waypoint.location().distance(&wp.location()) <= eps)
            {
                return;
            }
            out.push(RouteWaypoint {
                waypoint: wp.clone(),
                option,
                segment,
                kind,
            });
        };

        match source {
            EdgeSource::Segment(id) => {
                let segment = &network.segments[id];
                let option = if segment.is_junction() {
                    self.classify_turn(segment.heading_change())
                } else {
                    RoadOption::LaneFollow
                };
                for wp in &segment.path {
                    push(out, wp, option, id);
                }
            }
            EdgeSource::LaneChange(link_id) => {
                let link = network.lane_changes[link_id];
                let from = &network.segments[link.from].path;
                let to = &network.segments[link.to].path;
                for wp in &from[..from.len().div_ceil(2)] {
                    push(out, wp, RoadOption::LaneFollow, link.from);
                }
                let change = match link.side {
                    Side::Left => RoadOption::ChangeLaneLeft,
                    Side::Right => RoadOption::ChangeLaneRight,
                };
                let tail = &to[to.len() / 2..];
                for (i, wp) in tail.iter().enumerate() {
                    let option = if i == 0 { change } else { RoadOption::LaneFollow };
                    push(out, wp, option, link.to);
                }
            }
        }
    }

    /// Classify a junction crossing by its heading change in degrees.
    pub fn classify_turn(&self, heading_change: f64) -> RoadOption {
        if heading_change.abs() < self.config.turn_threshold_degrees {
            RoadOption::Straight
        } else if heading_change > 0.0 {
            RoadOption::Right
        } else {
            RoadOption::Left
        }
    }
}

fn finish_route(legs: Vec<RouteLeg>, components: usize) -> Route {
    let mut report = CoverageReport {
        components,
        respawns: legs.iter().filter(|leg| leg.respawn).count(),
        ..Default::default()
    };
    for edge in legs.iter().flat_map(|leg| leg.edges.iter()) {
        match edge.kind {
            EdgeKind::Required => {
                report.required_edges += 1;
                report.required_length_m += edge.length_m;
            }
            EdgeKind::Deadhead => {
                report.deadhead_edges += 1;
                report.deadhead_length_m += edge.length_m;
            }
            EdgeKind::LaneChange => {
                report.lane_changes += 1;
                report.deadhead_length_m += edge.length_m;
            }
            EdgeKind::Teleport => {}
        }
    }
    report.waypoints = legs.iter().map(|leg| leg.waypoints.len()).sum();
    Route { legs, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Location, Rotation, Transform};
    use crate::route::network::{LaneChange, LaneSegment};

    fn wp(x: f64, y: f64, yaw: f64, lane: i32, junction: bool) -> Waypoint {
        Waypoint {
            id: 0,
            transform: Transform::new(Location::new(x, y, 0.0), Rotation::from_yaw(yaw)),
            road_id: lane.abs(),
            section_id: 0,
            lane_id: lane,
            s: 0.0,
            lane_width: 3.5,
            is_junction: junction,
            lane_change: LaneChange::None,
        }
    }

    fn seg(a: (f64, f64), b: (f64, f64), lane: i32) -> LaneSegment {
        let yaw = (b.1 - a.1).atan2(b.0 - a.0).to_degrees();
        LaneSegment::new(vec![wp(a.0, a.1, yaw, lane, false), wp(b.0, b.1, yaw, lane, false)])
    }

    #[test]
    fn test_empty_network_fails() {
        let err = CoveragePlanner::default()
            .plan(&RoadNetwork::default(), None)
            .unwrap_err();
        assert!(matches!(err, DrishtiError::RoutePlanning(_)));
    }

    #[test]
    fn test_invalid_start_fails() {
        let network = RoadNetwork::new(vec![seg((0.0, 0.0), (10.0, 0.0), 1)], Vec::new());
        let off_road = wp(500.0, 500.0, 0.0, 7, false);
        let err = CoveragePlanner::default()
            .plan(&network, Some(&off_road))
            .unwrap_err();
        assert!(matches!(err, DrishtiError::RoutePlanning(_)));
    }

    #[test]
    fn test_balanced_loop_needs_no_deadhead() {
        let network = RoadNetwork::new(
            vec![
                seg((0.0, 0.0), (10.0, 0.0), 1),
                seg((10.0, 0.0), (10.0, 10.0), 2),
                seg((10.0, 10.0), (0.0, 0.0), 3),
            ],
            Vec::new(),
        );
        let route = CoveragePlanner::default().plan(&network, None).unwrap();
        assert_eq!(route.report.required_edges, 3);
        assert_eq!(route.report.deadhead_edges, 0);
        assert_eq!(route.report.respawns, 0);
        assert_eq!(route.covered_segments().len(), 3);
    }

    #[test]
    fn test_start_segment_first_and_no_trailing_deadhead() {
        // Two-way street: 0 -> 1 -> 2 and back.
        let network = RoadNetwork::new(
            vec![
                seg((0.0, 0.0), (10.0, 0.0), 1),
                seg((10.0, 0.0), (20.0, 0.0), 1),
                seg((20.0, 0.0), (10.0, 0.0), 2),
                seg((10.0, 0.0), (0.0, 0.0), 2),
            ],
            Vec::new(),
        );
        let start = network.segments[2].entry().clone();
        let route = CoveragePlanner::default().plan(&network, Some(&start)).unwrap();
        let first = route.edges().next().unwrap();
        assert_eq!(first.segment, Some(2));
        assert_eq!(route.edges().last().unwrap().kind, EdgeKind::Required);
        assert_eq!(route.covered_segments().len(), 4);
    }

    #[test]
    fn test_open_chain_deadheads_or_teleports() {
        // One-way chain cannot return to its start: a teleport closes it.
        let network = RoadNetwork::new(
            vec![seg((0.0, 0.0), (10.0, 0.0), 1), seg((10.0, 0.0), (20.0, 0.0), 1)],
            Vec::new(),
        );
        let route = CoveragePlanner::default().plan(&network, None).unwrap();
        assert_eq!(route.legs.len(), 1);
        assert_eq!(route.report.respawns, 0);
        assert_eq!(route.covered_segments().len(), 2);
    }

    #[test]
    fn test_islands_are_respawned() {
        let network = RoadNetwork::new(
            vec![
                seg((0.0, 0.0), (10.0, 0.0), 1),
                seg((10.0, 0.0), (0.0, 0.0), 2),
                seg((900.0, 0.0), (910.0, 0.0), 3),
                seg((910.0, 0.0), (900.0, 0.0), 4),
            ],
            Vec::new(),
        );
        let route = CoveragePlanner::default().plan(&network, None).unwrap();
        assert_eq!(route.report.components, 2);
        assert_eq!(route.legs.len(), 2);
        assert!(!route.legs[0].respawn);
        assert!(route.legs[1].respawn);
        assert_eq!(route.report.respawns, 1);
        assert_eq!(route.covered_segments().len(), 4);
    }

    #[test]
    fn test_classify_turn() {
        let planner = CoveragePlanner::default();
        assert_eq!(planner.classify_turn(10.0), RoadOption::Straight);
        assert_eq!(planner.classify_turn(90.0), RoadOption::Right);
        assert_eq!(planner.classify_turn(-90.0), RoadOption::Left);
    }

    #[test]
    fn test_junction_waypoints_carry_turn_option() {
        let turn = LaneSegment::new(vec![
            wp(0.0, 0.0, 0.0, 5, true),
            wp(4.0, 1.0, 45.0, 5, true),
            wp(5.0, 5.0, 90.0, 5, true),
        ]);
        let back = seg((5.0, 5.0), (0.0, 0.0), 6);
        let network = RoadNetwork::new(vec![turn, back], Vec::new());
        let route = CoveragePlanner::default().plan(&network, None).unwrap();
        let options: Vec<_> = route.waypoints().map(|w| w.option).collect();
        assert_eq!(&options[..3], &[RoadOption::Right; 3]);
        assert_eq!(options[3], RoadOption::LaneFollow);
    }
}
