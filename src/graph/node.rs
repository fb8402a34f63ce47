//! Node types of the corpus graph: documents, chunks, entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a document: the source filename stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Derive the id from a filename (strips a trailing `.pdf`).
    pub fn from_filename(filename: &str) -> Self {
        let stem = filename
            .strip_suffix(".pdf")
            .or_else(|| filename.strip_suffix(".PDF"))
            .unwrap_or(filename);
        Self(stem.to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a chunk: `{document_id}#{chunk_index}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(document_id: &DocumentId, chunk_index: u32) -> Self {
        Self(format!("{}#{}", document_id.as_str(), chunk_index))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a document inside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Ingested,
    Validated,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Ingested => "ingested",
            DocumentStatus::Validated => "validated",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "ingested" => Some(DocumentStatus::Ingested),
            "validated" => Some(DocumentStatus::Validated),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// A source document node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub total_pages: u32,
    pub category: Option<String>,
    pub division: Option<String>,
    pub chunk_count: u32,
    pub status: DocumentStatus,
    pub ingested_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(filename: &str, total_pages: u32) -> Self {
        Self {
            id: DocumentId::from_filename(filename),
            filename: filename.to_string(),
            total_pages,
            category: None,
            division: None,
            chunk_count: 0,
            status: DocumentStatus::Pending,
            ingested_at: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_division(mut self, division: impl Into<String>) -> Self {
        self.division = Some(division.into());
        self
    }
}

/// Classification of a chunk's dominant content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Content,
    Definition,
    Example,
    Table,
}

impl ChunkType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Content => "content",
            ChunkType::Definition => "definition",
            ChunkType::Example => "example",
            ChunkType::Table => "table",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "content" => Some(ChunkType::Content),
            "definition" => Some(ChunkType::Definition),
            "example" => Some(ChunkType::Example),
            "table" => Some(ChunkType::Table),
            _ => None,
        }
    }
}

/// A bounded span of document text; the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    /// 1-indexed page the chunk starts on; always within the document.
    pub page_num: u32,
    pub chunk_index: u32,
    pub token_count: u32,
    /// L2-normalized embedding of fixed dimension; empty until embedded.
    pub embedding: Vec<f32>,
    /// Unique-content-token ratio in [0, 1].
    pub semantic_density: f32,
    pub chunk_type: ChunkType,
    pub has_definitions: bool,
    pub has_examples: bool,
    /// Top non-stopword tokens, used by the keyword retriever bonus.
    pub keywords: Vec<String>,
}

/// Entity type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Product,
    Term,
    Amount,
    Percent,
    Org,
    Person,
    Other,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Product => "PRODUCT",
            EntityType::Term => "TERM",
            EntityType::Amount => "AMOUNT",
            EntityType::Percent => "PERCENT",
            EntityType::Org => "ORG",
            EntityType::Person => "PERSON",
            EntityType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRODUCT" => Some(EntityType::Product),
            "TERM" => Some(EntityType::Term),
            "AMOUNT" => Some(EntityType::Amount),
            "PERCENT" => Some(EntityType::Percent),
            "ORG" => Some(EntityType::Org),
            "PERSON" => Some(EntityType::Person),
            "OTHER" => Some(EntityType::Other),
            _ => None,
        }
    }
}

/// The unique key of an entity node: `(normalized, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub normalized: String,
    pub entity_type: EntityType,
}

impl EntityKey {
    pub fn new(normalized: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            normalized: normalized.into(),
            entity_type,
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type.as_str(), self.normalized)
    }
}

/// A normalized domain term or named entity. Persists across documents;
/// community fields are recomputed by the community builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// The surface form first seen for this entity.
    pub surface: String,
    pub key: EntityKey,
    pub first_seen: DateTime<Utc>,
    /// Number of chunks containing this entity; at least 1.
    pub occurrences: u32,
    pub community_id: Option<i64>,
    pub degree_centrality: f64,
    pub betweenness_centrality: f64,
    pub is_bridge: bool,
    pub connected_communities: u32,
}

impl Entity {
    pub fn new(surface: impl Into<String>, key: EntityKey) -> Self {
        Self {
            surface: surface.into(),
            key,
            first_seen: Utc::now(),
            occurrences: 1,
            community_id: None,
            degree_centrality: 0.0,
            betweenness_centrality: 0.0,
            is_bridge: false,
            connected_communities: 0,
        }
    }
}

/// A community of entities, identified by the community builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: i64,
    pub size: u32,
}
