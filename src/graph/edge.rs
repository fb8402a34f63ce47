//! Relationship types of the corpus graph.
//!
//! `HAS_CHUNK` is implicit in chunk ownership (every chunk row carries its
//! document id, giving each chunk exactly one in-edge by construction).
//! The explicit edge records here are the ones that carry properties.

use super::node::{ChunkId, EntityKey};
use serde::{Deserialize, Serialize};

/// `NEXT_CHUNK`: intra-document successor link. The per-document set of
/// these forms a single acyclic chain in chunk_index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextChunk {
    pub from: ChunkId,
    pub to: ChunkId,
}

/// `CONTAINS_ENTITY`: a chunk mentions an entity with a confidence from
/// the extractor that produced the mention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainsEntity {
    pub chunk_id: ChunkId,
    pub entity: EntityKey,
    pub confidence: f32,
}

/// An unordered entity pair, stored in canonical order so the undirected
/// `RELATED_TO` edge has exactly one representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityPair {
    a: EntityKey,
    b: EntityKey,
}

impl EntityPair {
    /// Build the canonical ordering of two entity keys. Returns `None`
    /// for a self-pair; an entity never relates to itself.
    pub fn new(x: EntityKey, y: EntityKey) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { a: x, b: y }),
            std::cmp::Ordering::Greater => Some(Self { a: y, b: x }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn first(&self) -> &EntityKey {
        &self.a
    }

    pub fn second(&self) -> &EntityKey {
        &self.b
    }
}

/// `RELATED_TO`: undirected co-occurrence edge between two entities.
/// Strength is the number of distinct chunks containing both; edges are
/// only materialized at strength >= 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedTo {
    pub pair: EntityPair,
    pub strength: u32,
}
