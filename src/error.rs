//! Error taxonomy shared across ingestion and query paths.
//!
//! `ErrorKind` classifies failures for the error-tracking log and for
//! retry decisions; the layer errors (`StoreError`, `IngestError`,
//! `QueryError`) carry the details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failure, independent of the error type that
/// produced it. Drives retry/rollback policy and the error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Extraction (including OCR fallback) produced under 100 characters.
    EmptyDocument,
    /// The byte stream could not be parsed as a PDF.
    Unreadable,
    /// A phase exceeded its wall-clock budget.
    TimeoutExceeded,
    /// Embedder or reranker model failed to load or infer.
    ModelUnavailable,
    /// The graph store rejected or failed a write.
    StoreUnavailable,
    /// Post-write completeness criteria did not hold.
    ValidationFailed,
    /// The caller's query deadline elapsed.
    QueryDeadlineExceeded,
    /// A data-model invariant was observed broken. Never retried.
    InvariantViolation,
}

impl ErrorKind {
    /// Whether a failure of this kind is worth retrying.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TimeoutExceeded | ErrorKind::ModelUnavailable | ErrorKind::StoreUnavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::EmptyDocument => "empty_document",
            ErrorKind::Unreadable => "unreadable",
            ErrorKind::TimeoutExceeded => "timeout_exceeded",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::QueryDeadlineExceeded => "query_deadline_exceeded",
            ErrorKind::InvariantViolation => "invariant_violation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the graph store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("date parsing error: {0}")]
    DateParse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from model backends (embedder, reranker, NER).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model returned no results")]
    EmptyResult,

    #[error("model unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while ingesting a single document.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unreadable pdf: {0}")]
    Unreadable(String),

    #[error("document produced under {0} characters of text")]
    EmptyDocument(usize),

    #[error("phase '{phase}' timed out after {seconds}s")]
    Timeout { phase: &'static str, seconds: u64 },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl IngestError {
    /// Map to the taxonomy kind for logging and retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Unreadable(_) => ErrorKind::Unreadable,
            IngestError::EmptyDocument(_) => ErrorKind::EmptyDocument,
            IngestError::Timeout { .. } => ErrorKind::TimeoutExceeded,
            IngestError::Model(_) => ErrorKind::ModelUnavailable,
            IngestError::Store(_) => ErrorKind::StoreUnavailable,
            IngestError::Validation(_) => ErrorKind::ValidationFailed,
            IngestError::Invariant(_) => ErrorKind::InvariantViolation,
        }
    }
}

/// Errors raised while serving a query. Most query-side failures degrade
/// inside the pipeline instead of surfacing here.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("community rebuild already running")]
    CommunityLocked,

    #[error("ingestion writers active; community rebuild refused (dwell not reached)")]
    IngestActive,

    #[error("raw graph access requires the raw-query capability")]
    RawAccessDenied,

    #[error("no embedder configured; vector strategies unavailable")]
    NoEmbedder,
}
