//! Vellum: graph-backed retrieval over long-form PDF corpora.
//!
//! Documents are ingested into a property graph of documents, chunks
//! (with dense embeddings), and normalized entities, overlaid with
//! co-occurrence communities. Queries run through a multi-strategy
//! retrieval pipeline (keyword, vector, entity, community-aware,
//! hybrid) with cross-encoder reranking, returning ranked chunks with
//! page-level citations.
//!
//! # Example
//!
//! ```no_run
//! use vellum::{Config, Engine, IngestOptions, SearchRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::open("corpus.db", Config::default())?;
//! engine.start();
//!
//! let bytes = std::fs::read("product_guide.pdf")?;
//! let report = engine
//!     .ingest(bytes, "product_guide.pdf", IngestOptions::default())
//!     .await;
//! println!("{:?}: {} chunks", report.status, report.chunk_count);
//!
//! let response = engine.search(&SearchRequest::new("What is an FX Forward?"))?;
//! for citation in &response.citations {
//!     println!("p{} {}: {}", citation.page_num, citation.document_name, citation.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod community;
pub mod config;
mod engine;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod query;
pub mod store;

pub use config::Config;
pub use engine::{Engine, RawAccess};
pub use error::{EngineError, ErrorKind, IngestError, ModelError, QueryError, StoreError};
pub use graph::{
    Chunk, ChunkId, ChunkType, Document, DocumentId, DocumentStatus, Entity, EntityKey, EntityType,
};
pub use ingest::{
    Embedder, IngestOptions, IngestReport, LopdfExtractor, PdfExtractor, StaticExtractor,
};
pub use query::{Citation, SearchRequest, SearchResponse, Strategy};
pub use store::{GraphStore, SearchFilter, SqliteStore};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
