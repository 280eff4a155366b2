//! Degree balancing as a min-cost transportation problem.
//!
//! Vertices with more required in-edges than out-edges (surplus) must be
//! left again by extra deadhead walks that end at vertices with the opposite
//! imbalance (deficit). Pairing them so the added length is minimal is a
//! transportation problem, solved here by successive shortest paths with
//! Johnson potentials on integer costs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Units shipped from one surplus vertex to one deficit vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    /// Index into the `supplies` slice.
    pub supply: usize,
    /// Index into the `demands` slice.
    pub demand: usize,
    pub units: u64,
}

#[derive(Clone, Copy, Debug)]
struct FlowEdge {
    to: usize,
    cap: i64,
    cost: i64,
    rev: usize,
}

/// Residual network for min-cost flow.
struct MinCostFlow {
    graph: Vec<Vec<FlowEdge>>,
}

impl MinCostFlow {
    fn new(n: usize) -> Self {
        Self {
            graph: vec![Vec::new(); n],
        }
    }

    /// Returns the position of the forward edge in `graph[from]`.
    fn add_edge(&mut self, from: usize, to: usize, cap: i64, cost: i64) -> usize {
        let fwd = self.graph[from].len();
        let bwd = self.graph[to].len() + usize::from(from == to);
        self.graph[from].push(FlowEdge {
            to,
            cap,
            cost,
            rev: bwd,
        });
        self.graph[to].push(FlowEdge {
            to: from,
            cap: 0,
            cost: -cost,
            rev: fwd,
        });
        fwd
    }

    /// Push up to `limit` units from `s` to `t`. Returns `(flow, cost)`.
    fn run(&mut self, s: usize, t: usize, limit: i64) -> (i64, i64) {
        let n = self.graph.len();
        let mut potential = vec![0i64; n];
        let mut flow = 0i64;
        let mut cost = 0i64;

        while flow < limit {
            let mut dist = vec![i64::MAX; n];
            let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
            let mut heap = BinaryHeap::new();
            dist[s] = 0;
            heap.push(Reverse((0i64, s)));

            while let Some(Reverse((d, u))) = heap.pop() {
                if d > dist[u] {
                    continue;
                }
                for (i, e) in self.graph[u].iter().enumerate() {
                    if e.cap <= 0 {
                        continue;
                    }
                    let reduced = e.cost + potential[u] - potential[e.to];
                    let nd = d + reduced;
                    if nd < dist[e.to] {
                        dist[e.to] = nd;
                        prev[e.to] = Some((u, i));
                        heap.push(Reverse((nd, e.to)));
                    }
                }
            }

            if dist[t] == i64::MAX {
                break;
            }
            for v in 0..n {
                if dist[v] != i64::MAX {
                    potential[v] += dist[v];
                }
            }

            // Bottleneck along the augmenting path.
            let mut push = limit - flow;
            let mut v = t;
            while let Some((u, i)) = prev[v] {
                push = push.min(self.graph[u][i].cap);
                v = u;
            }

            let mut v = t;
            while let Some((u, i)) = prev[v] {
                let rev = self.graph[u][i].rev;
                self.graph[u][i].cap -= push;
                self.graph[v][rev].cap += push;
                cost += push * self.graph[u][i].cost;
                v = u;
            }
            flow += push;
        }

        (flow, cost)
    }
}

/// Solve the balanced transportation problem.
///
/// `cost[i][j]` is the cost of one unit from supply `i` to demand `j`; total
/// supply must equal total demand. Every unit is assigned because the
/// bipartite network is complete.
pub fn transport(supplies: &[u64], demands: &[u64], cost: &[Vec<u64>]) -> Vec<Assignment> {
    let n_s = supplies.len();
    let n_d = demands.len();
    let source = n_s + n_d;
    let sink = source + 1;
    let mut mcf = MinCostFlow::new(n_s + n_d + 2);

    let total: u64 = supplies.iter().sum();
    for (i, &units) in supplies.iter().enumerate() {
        mcf.add_edge(source, i, units as i64, 0);
    }
    for (j, &units) in demands.iter().enumerate() {
        mcf.add_edge(n_s + j, sink, units as i64, 0);
    }

    let mut links = Vec::with_capacity(n_s * n_d);
    for i in 0..n_s {
        for j in 0..n_d {
            let pos = mcf.add_edge(i, n_s + j, total as i64, cost[i][j] as i64);
            links.push((i, j, pos));
        }
    }

    let (flow, total_cost) = mcf.run(source, sink, total as i64);
    tracing::trace!(flow, total_cost, "Transportation solved");

    links
        .into_iter()
        .filter_map(|(i, j, pos)| {
            let edge = mcf.graph[i][pos];
            let shipped = total as i64 - edge.cap;
            (shipped > 0).then_some(Assignment {
                supply: i,
                demand: j,
                units: shipped as u64,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total_cost(assignments: &[Assignment], cost: &[Vec<u64>]) -> u64 {
        assignments
            .iter()
            .map(|a| a.units * cost[a.supply][a.demand])
            .sum()
    }

    #[test]
    fn test_picks_cheaper_pairing() {
        // Greedy on the cheapest cell (0 -> 0) forces the expensive 1 -> 1.
        let cost = vec![vec![1, 2], vec![2, 100]];
        let assignments = transport(&[1, 1], &[1, 1], &cost);
        assert_eq!(total_cost(&assignments, &cost), 4);
    }

    #[test]
    fn test_multi_unit_supply() {
        let cost = vec![vec![5, 3, 9]];
        let assignments = transport(&[3], &[1, 1, 1], &cost);
        let shipped: u64 = assignments.iter().map(|a| a.units).sum();
        assert_eq!(shipped, 3);
        assert_eq!(total_cost(&assignments, &cost), 17);
    }

    #[test]
    fn test_empty_problem() {
        assert!(transport(&[], &[], &[]).is_empty());
    }
}
