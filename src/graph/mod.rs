//! Typed data model of the corpus graph.
//!
//! Nodes: `Document`, `Chunk`, `Entity` (plus the derived `Community`
//! overlay). Relationships: `HAS_CHUNK` (implicit ownership),
//! `NEXT_CHUNK`, `CONTAINS_ENTITY`, `RELATED_TO`.

mod edge;
mod node;

pub use edge::{ContainsEntity, EntityPair, NextChunk, RelatedTo};
pub use node::{
    Chunk, ChunkId, ChunkType, Community, Document, DocumentId, DocumentStatus, Entity, EntityKey,
    EntityType,
};
