//! Single-source shortest paths over the lane graph.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::graph::{EdgeId, GraphEdge, NodeId};

/// State for Dijkstra's algorithm priority queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DijkstraState {
    /// Current path cost in millimetres.
    pub cost: u64,
    /// Current node index.
    pub node: NodeId,
}

impl Ord for DijkstraState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for DijkstraState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest-path tree rooted at one source.
#[derive(Clone, Debug)]
pub struct ShortestPaths {
    pub source: NodeId,
    /// Distance per node, `None` when unreachable.
    pub dist: Vec<Option<u64>>,
    /// Edge used to reach each node.
    pub prev_edge: Vec<Option<EdgeId>>,
}

impl ShortestPaths {
    pub fn distance(&self, node: NodeId) -> Option<u64> {
        self.dist.get(node).copied().flatten()
    }

    /// Edge ids from the source to `goal`, or `None` if unreachable.
    pub fn path_to(&self, goal: NodeId, edges: &[GraphEdge]) -> Option<Vec<EdgeId>> {
        self.distance(goal)?;
        let mut path = Vec::new();
        let mut current = goal;
        while current != self.source {
            let edge = self.prev_edge[current]?;
            path.push(edge);
            current = edges[edge].from;
        }
        path.reverse();
        Some(path)
    }
}

/// Dijkstra from `source` over an adjacency list of `(neighbor, cost, edge)`.
pub fn shortest_paths(adjacency: &[Vec<(NodeId, u64, EdgeId)>], source: NodeId) -> ShortestPaths {
    let n = adjacency.len();
    let mut dist: Vec<Option<u64>> = vec![None; n];
    let mut prev_edge: Vec<Option<EdgeId>> = vec![None; n];

    if source >= n {
        return ShortestPaths {
            source,
            dist,
            prev_edge,
        };
    }

    dist[source] = Some(0);
    let mut heap = BinaryHeap::new();
    heap.push(DijkstraState {
        cost: 0,
        node: source,
    });

    while let Some(DijkstraState { cost, node }) = heap.pop() {
        // Skip if we've found a better path
        if dist[node].is_some_and(|d| cost > d) {
            continue;
        }

        for &(neighbor, edge_cost, edge) in &adjacency[node] {
            let new_dist = cost.saturating_add(edge_cost);
            if dist[neighbor].is_none_or(|d| new_dist < d) {
                dist[neighbor] = Some(new_dist);
                prev_edge[neighbor] = Some(edge);
                heap.push(DijkstraState {
                    cost: new_dist,
                    node: neighbor,
                });
            }
        }
    }

    ShortestPaths {
        source,
        dist,
        prev_edge,
    }
}
