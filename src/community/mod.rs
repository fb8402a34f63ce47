//! Community overlay: co-occurrence edges, Louvain clustering, and
//! per-entity metrics written back to the store.

pub mod cooccur;
pub mod louvain;
pub mod metrics;

pub use cooccur::build_related_edges;
pub use louvain::{louvain, partition_sets};
pub use metrics::{compute_metrics, NodeMetrics};

use crate::config::Config;
use crate::error::StoreResult;
use crate::graph::{Community, EntityKey};
use crate::store::{EntityMetrics, GraphStore};
use std::collections::HashMap;
use tracing::info;

/// Current communities with their member counts, read back from entity
/// assignments.
pub fn communities(store: &dyn GraphStore) -> StoreResult<Vec<Community>> {
    let mut sizes: std::collections::BTreeMap<i64, u32> = std::collections::BTreeMap::new();
    for entity in store.all_entities()? {
        if let Some(id) = entity.community_id {
            *sizes.entry(id).or_insert(0) += 1;
        }
    }
    Ok(sizes
        .into_iter()
        .map(|(id, size)| Community { id, size })
        .collect())
}

/// Outcome of one community rebuild.
#[derive(Debug, Clone)]
pub struct CommunityReport {
    pub related_edges: usize,
    pub communities: usize,
    pub entities_clustered: usize,
    pub bridge_nodes: usize,
}

/// Recompute the whole community overlay: RELATED_TO edges from chunk
/// co-occurrence, Louvain membership, then centrality and bridge
/// metrics on every entity. Entities outside the co-occurrence graph
/// get their community fields reset.
///
/// Callers must hold the engine's community rebuild lock; this function
/// assumes exclusive access to the overlay.
pub fn rebuild_communities(store: &dyn GraphStore, config: &Config) -> StoreResult<CommunityReport> {
    // Step 1: co-occurrence edges, sparsified at the strength floor.
    let memberships = store.chunk_entity_memberships()?;
    let edges = build_related_edges(&memberships, config.cooccurrence_min_strength);
    store.replace_related_edges(&edges)?;

    // Step 2: Louvain over the surviving edges. Node order is the
    // sorted entity key order, which pins down labels for identical
    // input.
    let mut keys: Vec<EntityKey> = Vec::new();
    let mut index_of: HashMap<EntityKey, usize> = HashMap::new();
    for edge in &edges {
        for key in [edge.pair.first(), edge.pair.second()] {
            if !index_of.contains_key(key) {
                index_of.insert(key.clone(), 0);
                keys.push(key.clone());
            }
        }
    }
    keys.sort();
    for (i, key) in keys.iter().enumerate() {
        *index_of.get_mut(key).unwrap() = i;
    }

    let weighted: Vec<(usize, usize, f64)> = edges
        .iter()
        .map(|e| {
            (
                index_of[e.pair.first()],
                index_of[e.pair.second()],
                e.strength as f64,
            )
        })
        .collect();
    let labels = louvain(keys.len(), &weighted, config.resolution());

    // Step 3: metrics over the same graph.
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];
    for &(a, b, _) in &weighted {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }
    for neighbors in adjacency.iter_mut() {
        neighbors.sort_unstable();
        neighbors.dedup();
    }
    let node_metrics = compute_metrics(&adjacency, &labels);

    let mut bridge_nodes = 0usize;
    for (i, key) in keys.iter().enumerate() {
        if node_metrics[i].is_bridge {
            bridge_nodes += 1;
        }
        store.update_entity_metrics(
            key,
            &EntityMetrics {
                community_id: Some(labels[i] as i64),
                degree_centrality: node_metrics[i].degree_centrality,
                betweenness_centrality: node_metrics[i].betweenness_centrality,
                is_bridge: node_metrics[i].is_bridge,
                connected_communities: node_metrics[i].connected_communities,
            },
        )?;
    }

    // Entities with no co-occurrence evidence drop out of the overlay.
    for entity in store.all_entities()? {
        if !index_of.contains_key(&entity.key) {
            store.update_entity_metrics(&entity.key, &EntityMetrics::default())?;
        }
    }

    let communities = labels.iter().copied().max().map_or(0, |m| m + 1);
    info!(
        related_edges = edges.len(),
        communities,
        entities_clustered = keys.len(),
        bridge_nodes,
        "community rebuild complete"
    );

    Ok(CommunityReport {
        related_edges: edges.len(),
        communities,
        entities_clustered: keys.len(),
        bridge_nodes,
    })
}
