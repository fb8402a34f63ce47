//! Per-entity graph metrics computed after clustering.
//!
//! Degree centrality is normalized within the entity's community;
//! betweenness uses Brandes over the whole entity graph, switching to
//! deterministic source sampling above `BETWEENNESS_EXACT_LIMIT` nodes.
//! Bridge detection counts the distinct communities among a node's
//! neighbors.

use std::collections::{HashSet, VecDeque};

/// Above this node count betweenness is sampled, not exact.
pub const BETWEENNESS_EXACT_LIMIT: usize = 5000;

/// Metrics for one node, indexed like the input node list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMetrics {
    pub degree_centrality: f64,
    pub betweenness_centrality: f64,
    pub is_bridge: bool,
    pub connected_communities: u32,
}

/// Compute all metrics. `adjacency[n]` lists the neighbors of node `n`
/// (deduplicated); `communities[n]` is the cluster label of node `n`.
pub fn compute_metrics(adjacency: &[Vec<usize>], communities: &[usize]) -> Vec<NodeMetrics> {
    let n = adjacency.len();
    let mut out = vec![NodeMetrics::default(); n];

    // Community sizes for degree normalization.
    let community_count = communities.iter().copied().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; community_count];
    for &c in communities {
        sizes[c] += 1;
    }

    for node in 0..n {
        let own = communities[node];

        // Degree within the community, normalized by its size.
        let intra = adjacency[node]
            .iter()
            .filter(|&&nb| communities[nb] == own)
            .count();
        let denom = sizes[own].saturating_sub(1);
        out[node].degree_centrality = if denom == 0 {
            0.0
        } else {
            intra as f64 / denom as f64
        };

        // Distinct communities among neighbors.
        let neighbor_comms: HashSet<usize> =
            adjacency[node].iter().map(|&nb| communities[nb]).collect();
        out[node].connected_communities = neighbor_comms.len() as u32;
        out[node].is_bridge = neighbor_comms.len() >= 2;
    }

    let betweenness = betweenness_centrality(adjacency);
    for node in 0..n {
        out[node].betweenness_centrality = betweenness[node];
    }

    out
}

/// Brandes betweenness, unweighted, normalized to [0, 1] for an
/// undirected graph. Sources are sampled deterministically (every k-th
/// node) when the graph exceeds the exact limit; scores scale by the
/// inverse sample fraction.
pub fn betweenness_centrality(adjacency: &[Vec<usize>]) -> Vec<f64> {
    let n = adjacency.len();
    let mut centrality = vec![0.0f64; n];
    if n < 3 {
        return centrality;
    }

    let stride = if n <= BETWEENNESS_EXACT_LIMIT {
        1
    } else {
        n.div_ceil(BETWEENNESS_EXACT_LIMIT)
    };
    let sources: Vec<usize> = (0..n).step_by(stride).collect();
    let scale_up = n as f64 / sources.len() as f64;

    for &source in &sources {
        // Brandes single-source accumulation.
        let mut stack = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut distance = vec![-1i64; n];
        sigma[source] = 1.0;
        distance[source] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(source);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &adjacency[v] {
                if distance[w] < 0 {
                    distance[w] = distance[v] + 1;
                    queue.push_back(w);
                }
                if distance[w] == distance[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != source {
                centrality[w] += delta[w] * scale_up;
            }
        }
    }

    // Undirected: each pair counted twice; then normalize by the
    // number of ordered pairs excluding the endpoint.
    let norm = ((n - 1) * (n - 2)) as f64;
    for c in centrality.iter_mut() {
        *c /= norm;
    }
    centrality
}
