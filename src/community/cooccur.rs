//! Co-occurrence edge construction.
//!
//! Counts, for every entity pair, the number of distinct chunks that
//! contain both. Pairs below the minimum strength are dropped
//! (sparsification); the survivors become RELATED_TO edges.

use crate::graph::{ChunkId, EntityKey, EntityPair, RelatedTo};
use std::collections::{HashMap, HashSet};

/// Build RELATED_TO edges from (chunk, entity) memberships. Only pairs
/// co-occurring in at least `min_strength` distinct chunks survive.
pub fn build_related_edges(
    memberships: &[(ChunkId, EntityKey)],
    min_strength: u32,
) -> Vec<RelatedTo> {
    // Chunk -> distinct entity set.
    let mut by_chunk: HashMap<&ChunkId, HashSet<&EntityKey>> = HashMap::new();
    for (chunk_id, key) in memberships {
        by_chunk.entry(chunk_id).or_default().insert(key);
    }

    let mut counts: HashMap<EntityPair, u32> = HashMap::new();
    for entities in by_chunk.values() {
        let mut sorted: Vec<&&EntityKey> = entities.iter().collect();
        sorted.sort();
        for i in 0..sorted.len() {
            for j in (i + 1)..sorted.len() {
                if let Some(pair) = EntityPair::new((*sorted[i]).clone(), (*sorted[j]).clone()) {
                    *counts.entry(pair).or_insert(0) += 1;
                }
            }
        }
    }

    let mut edges: Vec<RelatedTo> = counts
        .into_iter()
        .filter(|(_, strength)| *strength >= min_strength)
        .map(|(pair, strength)| RelatedTo { pair, strength })
        .collect();
    edges.sort_by(|a, b| a.pair.cmp(&b.pair));
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DocumentId, EntityType};

    fn chunk(n: u32) -> ChunkId {
        ChunkId::new(&DocumentId::from_string("doc"), n)
    }

    fn key(name: &str) -> EntityKey {
        EntityKey::new(name, EntityType::Term)
    }

    #[test]
    fn pairs_below_min_strength_are_omitted() {
        // a+b co-occur twice, a+c once.
        let memberships = vec![
            (chunk(0), key("a")),
            (chunk(0), key("b")),
            (chunk(1), key("a")),
            (chunk(1), key("b")),
            (chunk(2), key("a")),
            (chunk(2), key("c")),
        ];
        let edges = build_related_edges(&memberships, 2);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].strength, 2);
        assert_eq!(edges[0].pair.first(), &key("a"));
        assert_eq!(edges[0].pair.second(), &key("b"));
    }

    #[test]
    fn strength_counts_distinct_chunks_not_mentions() {
        // Duplicate membership rows in one chunk count once.
        let memberships = vec![
            (chunk(0), key("a")),
            (chunk(0), key("a")),
            (chunk(0), key("b")),
            (chunk(1), key("a")),
            (chunk(1), key("b")),
        ];
        let edges = build_related_edges(&memberships, 2);
        assert_eq!(edges[0].strength, 2);
    }

    #[test]
    fn empty_memberships_no_edges() {
        assert!(build_related_edges(&[], 2).is_empty());
    }

    #[test]
    fn output_is_deterministically_ordered() {
        let memberships: Vec<_> = (0..2)
            .flat_map(|c| {
                vec![
                    (chunk(c), key("z")),
                    (chunk(c), key("a")),
                    (chunk(c), key("m")),
                ]
            })
            .collect();
        let a = build_related_edges(&memberships, 2);
        let b = build_related_edges(&memberships, 2);
        assert_eq!(a.len(), 3);
        let pairs_a: Vec<_> = a.iter().map(|e| e.pair.clone()).collect();
        let pairs_b: Vec<_> = b.iter().map(|e| e.pair.clone()).collect();
        assert_eq!(pairs_a, pairs_b);
    }
}
