//! Hierholzer's algorithm for Euler circuits in directed multigraphs.

/// Euler circuit through every edge, starting and ending at `start`.
///
/// `edges[i] = (from, to)`. Returns edge indices in driving order, or `None`
/// when the edges do not form a single balanced, connected circuit through
/// `start`.
pub fn euler_circuit(node_count: usize, edges: &[(usize, usize)], start: usize) -> Option<Vec<usize>> {
    if edges.is_empty() {
        return Some(Vec::new());
    }
    if start >= node_count {
        return None;
    }

    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    let mut balance = vec![0i64; node_count];
    for (id, &(from, to)) in edges.iter().enumerate() {
        outgoing[from].push(id);
        balance[from] += 1;
        balance[to] -= 1;
    }
    if balance.iter().any(|&b| b != 0) {
        return None;
    }
    // Pop from the back, so reverse to consume edges in insertion order.
    for out in &mut outgoing {
        out.reverse();
    }

    let mut circuit = Vec::with_capacity(edges.len());
    // Stack of (node, edge used to reach it).
    let mut stack: Vec<(usize, Option<usize>)> = vec![(start, None)];

    while let Some(&(node, via)) = stack.last() {
        if let Some(edge) = outgoing[node].pop() {
            stack.push((edges[edge].1, Some(edge)));
        } else {
            stack.pop();
            if let Some(edge) = via {
                circuit.push(edge);
            }
        }
    }

    if circuit.len() != edges.len() {
        return None;
    }
    circuit.reverse();
    Some(circuit)
}
