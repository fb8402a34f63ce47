//! Graph storage: trait, SQLite backend, vector index, JSON export.

mod export;
mod sqlite;
pub mod vector;

pub use export::{export_graph, import_graph, GraphExport};
pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use crate::graph::{
    Chunk, ChunkId, ContainsEntity, Document, DocumentId, DocumentStatus, Entity, EntityKey,
    NextChunk, RelatedTo,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Filter predicates pushed down to the store. Filters are ANDed with
/// whatever predicate the retriever itself applies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Matches `Document.division`.
    pub division: Option<String>,
    /// Matches `Document.category`.
    pub category: Option<String>,
    /// Restricts to chunks containing the named product entity.
    pub product: Option<String>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.division.is_none() && self.category.is_none() && self.product.is_none()
    }

    pub fn with_division(mut self, division: impl Into<String>) -> Self {
        self.division = Some(division.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }
}

/// Community metrics written back onto an entity after a rebuild.
#[derive(Debug, Clone, Default)]
pub struct EntityMetrics {
    pub community_id: Option<i64>,
    pub degree_centrality: f64,
    pub betweenness_centrality: f64,
    pub is_bridge: bool,
    pub connected_communities: u32,
}

/// A single entity mention produced by the extractor for one chunk,
/// ready to be linked.
#[derive(Debug, Clone)]
pub struct EntityMention {
    pub surface: String,
    pub key: EntityKey,
    pub confidence: f32,
}

/// The full write set for one document: the document node, its chunks in
/// chunk_index order, and each chunk's entity mentions. Committed as one
/// transaction.
#[derive(Debug, Clone)]
pub struct DocumentWrite {
    pub document: Document,
    pub chunks: Vec<(Chunk, Vec<EntityMention>)>,
}

/// Counts and catalog information for the schema endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSummary {
    /// Node counts by label.
    pub labels: HashMap<String, u64>,
    /// Relationship counts by type.
    pub relationships: HashMap<String, u64>,
    pub indexes: Vec<String>,
    pub constraints: Vec<String>,
}

/// Storage backend for the corpus graph.
///
/// Implementations must be thread-safe; concurrent writes to disjoint
/// documents are safe, and entity upserts resolve conflicts on
/// `(normalized, type)`.
pub trait GraphStore: Send + Sync {
    // === Documents ===

    fn upsert_document(&self, doc: &Document) -> StoreResult<()>;

    fn load_document(&self, id: &DocumentId) -> StoreResult<Option<Document>>;

    fn list_documents(&self) -> StoreResult<Vec<Document>>;

    fn set_document_status(&self, id: &DocumentId, status: DocumentStatus) -> StoreResult<()>;

    /// Remove a document, its chunks, and all chunk-owned edges. Entity
    /// occurrences are decremented; entities left with zero occurrences
    /// are removed along with their RELATED_TO edges. Returns whether a
    /// document row existed.
    fn delete_document_cascade(&self, id: &DocumentId) -> StoreResult<bool>;

    // === Chunks ===

    fn upsert_chunk(&self, chunk: &Chunk) -> StoreResult<()>;

    fn load_chunk(&self, id: &ChunkId) -> StoreResult<Option<Chunk>>;

    /// All chunks of a document, in chunk_index order.
    fn chunks_for_document(&self, id: &DocumentId) -> StoreResult<Vec<Chunk>>;

    fn link_next_chunk(&self, from: &ChunkId, to: &ChunkId) -> StoreResult<()>;

    /// The NEXT_CHUNK chain of a document.
    fn next_chunks(&self, document_id: &DocumentId) -> StoreResult<Vec<NextChunk>>;

    /// Neighboring chunks of `id` within `hops` NEXT_CHUNK steps in
    /// either direction, excluding `id` itself. `hops` is capped at 2.
    fn expand_context(&self, id: &ChunkId, hops: u32) -> StoreResult<Vec<Chunk>>;

    // === Entities ===

    /// Insert the entity or bump its occurrence count. Idempotent in
    /// effect under retry when the caller re-deletes before re-writing.
    fn upsert_entity(&self, surface: &str, key: &EntityKey) -> StoreResult<()>;

    fn link_contains_entity(&self, link: &ContainsEntity) -> StoreResult<()>;

    fn entity_lookup(&self, key: &EntityKey) -> StoreResult<Option<Entity>>;

    fn all_entities(&self) -> StoreResult<Vec<Entity>>;

    /// Chunks containing the entity, with the CONTAINS_ENTITY confidence.
    fn chunks_containing(
        &self,
        key: &EntityKey,
        filter: &SearchFilter,
    ) -> StoreResult<Vec<(Chunk, f32)>>;

    fn mentions_for_chunk(&self, id: &ChunkId) -> StoreResult<Vec<ContainsEntity>>;

    /// Every (chunk, entity) membership pair; input to the co-occurrence
    /// builder.
    fn chunk_entity_memberships(&self) -> StoreResult<Vec<(ChunkId, EntityKey)>>;

    fn update_entity_metrics(&self, key: &EntityKey, metrics: &EntityMetrics) -> StoreResult<()>;

    /// Write a full entity row verbatim, including occurrences and
    /// community metrics. Import path only; regular ingestion goes
    /// through `upsert_entity`.
    fn restore_entity(&self, entity: &Entity) -> StoreResult<()>;

    // === Co-occurrence edges ===

    /// Atomically replace the RELATED_TO edge set with a recomputed one.
    fn replace_related_edges(&self, edges: &[RelatedTo]) -> StoreResult<()>;

    fn related_edges(&self) -> StoreResult<Vec<RelatedTo>>;

    // === Atomic document write ===

    /// Write the document node, all chunks, NEXT_CHUNK links and entity
    /// links in one transaction. On any failure nothing is visible.
    fn commit_document(&self, write: &DocumentWrite) -> StoreResult<()>;

    // === Retrieval primitives ===

    /// Full-text OR search over chunk text. Returns matching chunks;
    /// scoring happens in the retriever.
    fn keyword_search_chunks(
        &self,
        terms: &[String],
        filter: &SearchFilter,
        limit: usize,
    ) -> StoreResult<Vec<Chunk>>;

    /// Nearest chunks by cosine similarity to the (normalized) query
    /// vector.
    fn vector_search_chunks(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> StoreResult<Vec<(Chunk, f32)>>;

    /// Chunks whose entities lie in any of the given communities.
    fn chunks_in_communities(
        &self,
        communities: &[i64],
        filter: &SearchFilter,
        limit: usize,
    ) -> StoreResult<Vec<Chunk>>;

    /// Chunks linked to bridge entities that touch any of the given
    /// communities.
    fn bridge_chunks(
        &self,
        communities: &[i64],
        filter: &SearchFilter,
        limit: usize,
    ) -> StoreResult<Vec<Chunk>>;

    // === Admin ===

    fn schema_summary(&self) -> StoreResult<SchemaSummary>;

    /// Read-only SQL pass-through for expert users; rows as JSON objects.
    fn raw_read(&self, sql: &str) -> StoreResult<Vec<serde_json::Value>>;

    /// Write SQL pass-through; returns affected row count.
    fn raw_execute(&self, sql: &str) -> StoreResult<usize>;
}
