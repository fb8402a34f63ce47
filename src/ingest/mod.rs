//! Ingestion: PDF extraction, chunking, embedding, entity extraction,
//! and the per-document orchestration that ties them together.

pub mod chunker;
pub mod embed;
pub mod entities;
pub mod error_log;
pub mod extract;
pub mod patterns;
pub mod pipeline;
pub mod validate;

pub use chunker::Chunker;
pub use embed::Embedder;
#[cfg(feature = "embeddings")]
pub use embed::FastEmbedder;
pub use embed::HashEmbedder;
pub use entities::{EntityExtractor, ExtractedEntity, HeuristicNer, NerBackend};
pub use error_log::{ErrorLog, ErrorRecord};
pub use extract::{LopdfExtractor, OcrEngine, Page, PdfExtractor, StaticExtractor};
pub use pipeline::{IngestOptions, IngestPipeline, IngestReport, PhaseError};
pub use validate::{validate_document, ValidationIssue};
