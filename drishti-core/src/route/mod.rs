//! Full-coverage route planning over the lane graph.
//!
//! Pipeline:
//! 1. [`LaneGraph::build`] merges lane endpoints into integer vertices.
//! 2. [`balance::transport`] pairs unbalanced vertices at minimum deadhead cost.
//! 3. [`euler::euler_circuit`] walks every edge of each component once.
//! 4. [`CoveragePlanner`] stitches circuits into legs of waypoints.

pub mod balance;
pub mod dijkstra;
pub mod euler;
pub mod graph;
pub mod network;
pub mod planner;

pub use graph::{EdgeKind, LaneGraph};
pub use network::{
    LaneChange, LaneChangeLink, LaneSegment, RoadNetwork, SegmentId, Side, Waypoint, WaypointId,
};
pub use planner::{
    CoveragePlanner, CoverageReport, PlannerConfig, RoadOption, Route, RouteEdge, RouteLeg,
    RouteWaypoint,
};
