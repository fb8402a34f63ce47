//! Louvain modularity clustering over the entity graph.
//!
//! Two-phase Louvain: local moving until no gain, then community
//! aggregation, repeated until the partition stops changing. All
//! iteration orders are fixed (node index order, tie-breaks toward the
//! smaller community id), so identical input produces the identical
//! partition; labels are then compacted in first-seen node order.

use petgraph::graph::UnGraph;

/// Weighted undirected edge between node indices.
pub type WeightedEdge = (usize, usize, f64);

/// Cluster nodes `0..node_count` connected by `edges`. Returns one
/// community label per node, compacted to `0..k`.
pub fn louvain(node_count: usize, edges: &[WeightedEdge], resolution: f64) -> Vec<usize> {
    if node_count == 0 {
        return Vec::new();
    }

    // Current mapping from original node to its community at this level.
    let mut membership: Vec<usize> = (0..node_count).collect();
    let mut level_nodes = node_count;
    let mut level_edges: Vec<WeightedEdge> = edges.to_vec();

    loop {
        let assignment = one_level(level_nodes, &level_edges, resolution);

        // Compact the level's labels.
        let mut relabel: Vec<Option<usize>> = vec![None; level_nodes];
        let mut next = 0usize;
        for node in 0..level_nodes {
            let c = assignment[node];
            if relabel[c].is_none() {
                relabel[c] = Some(next);
                next += 1;
            }
        }
        let compact: Vec<usize> = assignment.iter().map(|&c| relabel[c].unwrap()).collect();

        // Fold into the original-node membership.
        for m in membership.iter_mut() {
            *m = compact[*m];
        }

        if next == level_nodes {
            // No aggregation happened; fixed point.
            break;
        }

        // Build the aggregated graph for the next level.
        let mut merged: std::collections::HashMap<(usize, usize), f64> =
            std::collections::HashMap::new();
        for &(a, b, w) in &level_edges {
            let (ca, cb) = (compact[a], compact[b]);
            let key = if ca <= cb { (ca, cb) } else { (cb, ca) };
            *merged.entry(key).or_insert(0.0) += w;
        }
        let mut next_edges: Vec<WeightedEdge> =
            merged.into_iter().map(|((a, b), w)| (a, b, w)).collect();
        next_edges.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));

        level_nodes = next;
        level_edges = next_edges;
    }

    // Compact final labels in first-seen node order.
    let mut relabel: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    let mut next = 0usize;
    membership
        .iter()
        .map(|&c| {
            *relabel.entry(c).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            })
        })
        .collect()
}

/// One local-moving pass of Louvain. Returns a (non-compacted)
/// community label per node.
fn one_level(node_count: usize, edges: &[WeightedEdge], resolution: f64) -> Vec<usize> {
    // Adjacency built through petgraph; self-loops carry intra-community
    // weight from aggregation.
    let mut graph: UnGraph<(), f64, u32> = UnGraph::with_capacity(node_count, edges.len());
    for _ in 0..node_count {
        graph.add_node(());
    }
    for &(a, b, w) in edges {
        graph.add_edge((a as u32).into(), (b as u32).into(), w);
    }

    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); node_count];
    let mut self_loops: Vec<f64> = vec![0.0; node_count];
    let mut total_weight = 0.0f64;
    for edge in graph.edge_indices() {
        let (a, b) = graph.edge_endpoints(edge).unwrap();
        let w = graph[edge];
        let (a, b) = (a.index(), b.index());
        total_weight += w;
        if a == b {
            self_loops[a] += 2.0 * w;
        } else {
            adjacency[a].push((b, w));
            adjacency[b].push((a, w));
        }
    }
    for neighbors in adjacency.iter_mut() {
        neighbors.sort_by(|x, y| x.0.cmp(&y.0));
    }

    if total_weight == 0.0 {
        return (0..node_count).collect();
    }
    let two_m = 2.0 * total_weight;

    // Weighted degree per node, including self-loops.
    let degree: Vec<f64> = (0..node_count)
        .map(|n| adjacency[n].iter().map(|(_, w)| w).sum::<f64>() + self_loops[n])
        .collect();

    let mut community: Vec<usize> = (0..node_count).collect();
    // Sum of degrees per community.
    let mut tot: Vec<f64> = degree.clone();

    let mut moved = true;
    while moved {
        moved = false;
        for node in 0..node_count {
            let current = community[node];

            // Weight from this node to each neighboring community.
            let mut to_comm: std::collections::BTreeMap<usize, f64> =
                std::collections::BTreeMap::new();
            for &(neighbor, w) in &adjacency[node] {
                *to_comm.entry(community[neighbor]).or_insert(0.0) += w;
            }

            // Remove the node from its community for gain arithmetic.
            tot[current] -= degree[node];
            let base_in = to_comm.get(&current).copied().unwrap_or(0.0);
            let base_gain = base_in - resolution * tot[current] * degree[node] / two_m;

            // BTreeMap iteration gives ascending community ids, so the
            // first strictly-better candidate wins ties deterministically.
            let mut best_comm = current;
            let mut best_gain = base_gain;
            for (&candidate, &k_in) in &to_comm {
                if candidate == current {
                    continue;
                }
                let gain = k_in - resolution * tot[candidate] * degree[node] / two_m;
                if gain > best_gain + 1e-12 {
                    best_gain = gain;
                    best_comm = candidate;
                }
            }

            tot[best_comm] += degree[node];
            if best_comm != current {
                community[node] = best_comm;
                moved = true;
            }
        }
    }

    community
}

/// Group labels into membership sets, for partition comparisons.
pub fn partition_sets(labels: &[usize]) -> Vec<Vec<usize>> {
    let mut by_label: std::collections::BTreeMap<usize, Vec<usize>> =
        std::collections::BTreeMap::new();
    for (node, &label) in labels.iter().enumerate() {
        by_label.entry(label).or_default().push(node);
    }
    let mut sets: Vec<Vec<usize>> = by_label.into_values().collect();
    sets.sort();
    sets
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two dense triangles joined by one weak edge.
    fn two_triangles() -> (usize, Vec<WeightedEdge>) {
        let edges = vec![
            (0, 1, 3.0),
            (1, 2, 3.0),
            (0, 2, 3.0),
            (3, 4, 3.0),
            (4, 5, 3.0),
            (3, 5, 3.0),
            (2, 3, 1.0),
        ];
        (6, edges)
    }

    #[test]
    fn empty_graph() {
        assert!(louvain(0, &[], 1.0).is_empty());
    }

    #[test]
    fn isolated_nodes_stay_singletons() {
        let labels = louvain(3, &[], 1.0);
        assert_eq!(labels.len(), 3);
        let sets = partition_sets(&labels);
        assert_eq!(sets.len(), 3);
    }

    #[test]
    fn two_triangles_split_into_two_communities() {
        let (n, edges) = two_triangles();
        let labels = louvain(n, &edges, 1.0);
        let sets = partition_sets(&labels);
        assert_eq!(sets.len(), 2);
        assert!(sets.contains(&vec![0, 1, 2]));
        assert!(sets.contains(&vec![3, 4, 5]));
    }

    // === Scenario: identical input gives an identical partition ===

    #[test]
    fn rerun_is_stable() {
        let (n, edges) = two_triangles();
        let first = partition_sets(&louvain(n, &edges, 1.0));
        for _ in 0..5 {
            let again = partition_sets(&louvain(n, &edges, 1.0));
            assert_eq!(first, again);
        }
    }

    #[test]
    fn high_resolution_yields_finer_partition() {
        let (n, edges) = two_triangles();
        let coarse = partition_sets(&louvain(n, &edges, 0.5)).len();
        let fine = partition_sets(&louvain(n, &edges, 2.0)).len();
        assert!(fine >= coarse);
    }

    #[test]
    fn connected_pair_merges() {
        let labels = louvain(2, &[(0, 1, 1.0)], 1.0);
        assert_eq!(labels[0], labels[1]);
    }
}
