//! Integer-indexed lane graph.
//!
//! Vertices are segment endpoints merged by position; every lane segment
//! becomes one required edge. Lane-change links become connector edges that
//! may be driven while deadheading but never need to be covered.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::network::{RoadNetwork, SegmentId};
use crate::core::Location;

/// Graph vertex index.
pub type NodeId = usize;

/// Edge index into [`LaneGraph::edges`].
pub type EdgeId = usize;

/// How an edge enters the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// A lane segment that must be driven at least once.
    Required,
    /// A lane segment driven again only to reach an unbalanced vertex.
    Deadhead,
    /// Mid-lane move into a neighboring lane, usable for deadheading.
    LaneChange,
    /// No road path exists; the vehicle is respawned at the target.
    Teleport,
}

/// Directed edge payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeSource {
    Segment(SegmentId),
    /// Index into [`RoadNetwork::lane_changes`].
    LaneChange(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    /// Length in millimetres. Never zero.
    pub cost_mm: u64,
    pub source: EdgeSource,
}

impl GraphEdge {
    pub fn is_required(&self) -> bool {
        matches!(self.source, EdgeSource::Segment(_))
    }
}

/// Converts a length in meters to a positive millimetre cost.
pub fn cost_mm(meters: f64) -> u64 {
    ((meters * 1000.0).round() as u64).max(1)
}

/// Spatial hash used to merge endpoints that share a position.
struct NodeIndex {
    cell: f64,
    epsilon: f64,
    buckets: HashMap<(i64, i64, i64), Vec<NodeId>>,
}

impl NodeIndex {
    fn new(epsilon: f64) -> Self {
        Self {
            cell: epsilon.max(1e-6),
            epsilon,
            buckets: HashMap::new(),
        }
    }

    fn key(&self, p: &Location) -> (i64, i64, i64) {
        (
            (p.x / self.cell).floor() as i64,
            (p.y / self.cell).floor() as i64,
            (p.z / self.cell).floor() as i64,
        )
    }

    fn find(&self, p: &Location, nodes: &[Location]) -> Option<NodeId> {
        let (kx, ky, kz) = self.key(p);
        let mut best: Option<(NodeId, f64)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(bucket) = self.buckets.get(&(kx + dx, ky + dy, kz + dz)) else {
                        continue;
                    };
                    for &id in bucket {
                        let d = nodes[id].distance(p);
                        if d <= self.epsilon && best.is_none_or(|(_, bd)| d < bd) {
                            best = Some((id, d));
                        }
                    }
                }
            }
        }
        best.map(|(id, _)| id)
    }

    fn insert(&mut self, p: &Location, id: NodeId) {
        let key = self.key(p);
        self.buckets.entry(key).or_default().push(id);
    }
}

/// Directed multigraph over lane endpoints.
#[derive(Clone, Debug, Default)]
pub struct LaneGraph {
    pub nodes: Vec<Location>,
    pub edges: Vec<GraphEdge>,
    /// Outgoing edge ids per node.
    pub outgoing: Vec<Vec<EdgeId>>,
    /// Entry and exit node per segment.
    pub segment_nodes: Vec<(NodeId, NodeId)>,
}

impl LaneGraph {
    /// Build the graph, merging endpoints closer than `merge_epsilon` meters.
    pub fn build(network: &RoadNetwork, merge_epsilon: f64) -> Self {
        let mut graph = LaneGraph::default();
        let mut index = NodeIndex::new(merge_epsilon);

        for (segment_id, segment) in network.segments.iter().enumerate() {
            let from = graph.node_at(&mut index, segment.entry().location());
            let to = graph.node_at(&mut index, segment.exit().location());
            graph.segment_nodes.push((from, to));
            graph.push_edge(GraphEdge {
                from,
                to,
                cost_mm: cost_mm(segment.length()),
                source: EdgeSource::Segment(segment_id),
            });
        }

        for (link_id, link) in network.lane_changes.iter().enumerate() {
            let (Some(&(from, _)), Some(&(_, to))) = (
                graph.segment_nodes.get(link.from),
                graph.segment_nodes.get(link.to),
            ) else {
                continue;
            };
            // Driven as the first half of one lane and the second half of the other.
            let length = 0.5 * (network.segments[link.from].length()
                + network.segments[link.to].length());
            graph.push_edge(GraphEdge {
                from,
                to,
                cost_mm: cost_mm(length),
                source: EdgeSource::LaneChange(link_id),
            });
        }

        graph
    }

    fn node_at(&mut self, index: &mut NodeIndex, p: Location) -> NodeId {
        if let Some(id) = index.find(&p, &self.nodes) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(p);
        self.outgoing.push(Vec::new());
        index.insert(&p, id);
        id
    }

    fn push_edge(&mut self, edge: GraphEdge) {
        let id = self.edges.len();
        self.outgoing[edge.from].push(id);
        self.edges.push(edge);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Adjacency list `(neighbor, cost, edge)` over every drivable edge.
    pub fn adjacency(&self) -> Vec<Vec<(NodeId, u64, EdgeId)>> {
        self.outgoing
            .iter()
            .map(|out| {
                out.iter()
                    .map(|&e| (self.edges[e].to, self.edges[e].cost_mm, e))
                    .collect()
            })
            .collect()
    }

    /// Required in-degree minus out-degree per node.
    pub fn imbalance(&self) -> Vec<i64> {
        let mut delta = vec![0i64; self.nodes.len()];
        for edge in self.edges.iter().filter(|e| e.is_required()) {
            delta[edge.to] += 1;
            delta[edge.from] -= 1;
        }
        delta
    }

    /// Weakly connected components touching at least one required edge.
    ///
    /// Returns a component label per node (`None` for nodes without required
    /// edges reachable through any edge) and the number of components.
    /// Labels follow the order of the lowest segment id in each component.
    pub fn components(&self) -> (Vec<Option<usize>>, usize) {
        let mut uf = UnionFind::new(self.nodes.len());
        for edge in &self.edges {
            uf.union(edge.from, edge.to);
        }

        let mut label_of_root: HashMap<usize, usize> = HashMap::new();
        for &(from, _) in &self.segment_nodes {
            let root = uf.find(from);
            let next = label_of_root.len();
            label_of_root.entry(root).or_insert(next);
        }

        let labels = (0..self.nodes.len())
            .map(|n| label_of_root.get(&uf.find(n)).copied())
            .collect();
        (labels, label_of_root.len())
    }
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}
