//! Per-document ingestion orchestration.
//!
//! Each document runs the DAG Extract -> Chunk -> (Embed || Entities)
//! -> Write -> Validate -> MarkValidated inside a bounded worker pool.
//! Retryable phases get up to `max_phase_retries` attempts with
//! exponential backoff; a document that exhausts its retries is rolled
//! back with `delete_document_cascade` and recorded in the error log.
//! One failed document never poisons the pool.

use super::chunker::Chunker;
use super::embed::Embedder;
use super::entities::EntityExtractor;
use super::error_log::ErrorLog;
use super::extract::PdfExtractor;
use super::validate::validate_document;
use crate::config::Config;
use crate::error::{ErrorKind, IngestError, ModelError};
use crate::graph::{Chunk, ChunkId, Document, DocumentId, DocumentStatus};
use crate::store::{DocumentWrite, EntityMention, GraphStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Embedding batch size within one document. Documents are never
/// batched together; failure boundaries stay per-document.
const EMBED_BATCH: usize = 32;

/// Caller-supplied metadata for one ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub category: Option<String>,
    pub division: Option<String>,
}

/// One phase failure, as reported to the caller.
#[derive(Debug, Clone)]
pub struct PhaseError {
    pub phase: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one document ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    pub chunk_count: u32,
    pub entity_count: u32,
    pub errors: Vec<PhaseError>,
}

impl IngestReport {
    fn failed(document_id: DocumentId, errors: Vec<PhaseError>) -> Self {
        Self {
            document_id,
            status: DocumentStatus::Failed,
            chunk_count: 0,
            entity_count: 0,
            errors,
        }
    }
}

/// The ingestion orchestrator.
pub struct IngestPipeline {
    store: Arc<dyn GraphStore>,
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn Embedder>,
    entities: Arc<EntityExtractor>,
    chunker: Chunker,
    config: Config,
    workers: Arc<Semaphore>,
    error_log: Arc<ErrorLog>,
    backoff_base: Duration,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn GraphStore>,
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn Embedder>,
        config: Config,
        error_log: Arc<ErrorLog>,
    ) -> Self {
        let workers = config.effective_workers();
        Self {
            store,
            extractor,
            embedder,
            entities: Arc::new(EntityExtractor::new()),
            chunker: Chunker::new(&config),
            config,
            workers: Arc::new(Semaphore::new(workers)),
            error_log,
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Override the retry backoff base (fast test loops).
    pub fn with_retry_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Override the entity extractor (custom NER backend).
    pub fn with_entity_extractor(mut self, entities: Arc<EntityExtractor>) -> Self {
        self.entities = entities;
        self
    }

    /// Ingest one document end-to-end. Always returns a report; errors
    /// land in `report.errors` with the document marked failed.
    pub async fn ingest_document(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        options: IngestOptions,
    ) -> IngestReport {
        let _permit = self
            .workers
            .acquire()
            .await
            .expect("worker semaphore never closes");
        self.run_document(bytes, filename, options).await
    }

    async fn run_document(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        options: IngestOptions,
    ) -> IngestReport {
        let document_id = DocumentId::from_filename(filename);
        let timeouts = self.config.ingest_phase_timeouts;
        info!(document_id = %document_id, filename, "ingestion started");

        // --- Extract ---
        let pages = {
            let extractor = self.extractor.clone();
            let bytes = bytes.clone();
            let name = filename.to_string();
            let result = self
                .run_phase("extract", timeouts.extract_ms, &document_id, || {
                    let extractor = extractor.clone();
                    let bytes = bytes.clone();
                    let name = name.clone();
                    async move {
                        tokio::task::spawn_blocking(move || extractor.extract(&bytes, &name))
                            .await
                            .map_err(|e| IngestError::Invariant(format!("extract task: {e}")))?
                    }
                })
                .await;
            match result {
                Ok(pages) => pages,
                Err(report_err) => {
                    // Nothing written yet; no rollback needed.
                    return IngestReport::failed(document_id, vec![report_err]);
                }
            }
        };

        // --- Chunk (in-process, no timeout of its own) ---
        let total_pages = pages.len() as u32;
        let drafts = self.chunker.chunk_pages(&pages);
        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();

        // --- Embed || Entities (fork, join before write) ---
        let embed_fut = self.run_phase("embed", timeouts.embed_ms, &document_id, || {
            let embedder = self.embedder.clone();
            let texts = texts.clone();
            async move {
                tokio::task::spawn_blocking(move || embed_all(embedder.as_ref(), &texts))
                    .await
                    .map_err(|e| IngestError::Invariant(format!("embed task: {e}")))?
            }
        });
        let entities_fut = self.run_phase("entities", timeouts.entities_ms, &document_id, || {
            let extractor = self.entities.clone();
            let texts = texts.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    Ok(texts
                        .iter()
                        .map(|t| extractor.extract(t))
                        .collect::<Vec<_>>())
                })
                .await
                .map_err(|e| IngestError::Invariant(format!("entities task: {e}")))?
            }
        });
        let (embeddings, mentions) = match tokio::join!(embed_fut, entities_fut) {
            (Ok(e), Ok(m)) => (e, m),
            (embed, entities) => {
                let mut errors = Vec::new();
                if let Err(e) = embed {
                    errors.push(e);
                }
                if let Err(e) = entities {
                    errors.push(e);
                }
                return IngestReport::failed(document_id, errors);
            }
        };

        // --- Assemble the write set ---
        let mut document = Document::new(filename, total_pages);
        document.category = options.category;
        document.division = options.division;

        let mut chunks: Vec<(Chunk, Vec<EntityMention>)> = Vec::with_capacity(drafts.len());
        let mut entity_keys = std::collections::HashSet::new();
        for (index, (draft, embedding)) in drafts.iter().zip(embeddings).enumerate() {
            let chunk = Chunk {
                id: ChunkId::new(&document.id, index as u32),
                document_id: document.id.clone(),
                text: draft.text.clone(),
                page_num: draft.page_num,
                chunk_index: index as u32,
                token_count: draft.token_count,
                embedding,
                semantic_density: draft.semantic_density,
                chunk_type: draft.chunk_type,
                has_definitions: draft.has_definitions,
                has_examples: draft.has_examples,
                keywords: draft.keywords.clone(),
            };
            let chunk_mentions: Vec<EntityMention> = mentions[index]
                .iter()
                .map(|e| {
                    entity_keys.insert(e.key.clone());
                    EntityMention {
                        surface: e.surface.clone(),
                        key: e.key.clone(),
                        confidence: e.confidence,
                    }
                })
                .collect();
            chunks.push((chunk, chunk_mentions));
        }
        let entity_count = entity_keys.len() as u32;
        let chunk_count = chunks.len() as u32;
        let write = DocumentWrite { document, chunks };

        // --- Write (idempotent re-ingest: replace any prior state) ---
        let write_result = self
            .run_phase("write", timeouts.write_ms, &document_id, || {
                let store = self.store.clone();
                let write = write.clone();
                let id = document_id.clone();
                async move {
                    store.delete_document_cascade(&id)?;
                    store.commit_document(&write)?;
                    Ok(())
                }
            })
            .await;
        if let Err(report_err) = write_result {
            self.rollback(&document_id).await;
            return IngestReport::failed(document_id, vec![report_err]);
        }

        // --- Validate ---
        let written: Vec<Chunk> = write.chunks.iter().map(|(c, _)| c.clone()).collect();
        if let Err(issue) = validate_document(total_pages, &written, &self.config.validation) {
            let message = issue.to_string();
            warn!(document_id = %document_id, %message, "validation failed, rolling back");
            self.error_log.record(
                document_id.as_str(),
                "validate",
                ErrorKind::ValidationFailed,
                &message,
            );
            self.rollback(&document_id).await;
            return IngestReport::failed(
                document_id,
                vec![PhaseError {
                    phase: "validate",
                    kind: ErrorKind::ValidationFailed,
                    message,
                }],
            );
        }

        // --- MarkValidated ---
        if let Err(e) = self
            .store
            .set_document_status(&document_id, DocumentStatus::Validated)
        {
            self.error_log.record(
                document_id.as_str(),
                "validate",
                ErrorKind::StoreUnavailable,
                &e.to_string(),
            );
            self.rollback(&document_id).await;
            return IngestReport::failed(
                document_id,
                vec![PhaseError {
                    phase: "validate",
                    kind: ErrorKind::StoreUnavailable,
                    message: e.to_string(),
                }],
            );
        }

        info!(
            document_id = %document_id,
            chunk_count,
            entity_count,
            "ingestion validated"
        );
        IngestReport {
            document_id,
            status: DocumentStatus::Validated,
            chunk_count,
            entity_count,
            errors: Vec::new(),
        }
    }

    /// Ingest a batch of documents concurrently across the worker pool.
    pub async fn ingest_many(
        self: &Arc<Self>,
        inputs: Vec<(Vec<u8>, String, IngestOptions)>,
    ) -> Vec<IngestReport> {
        let mut handles = Vec::with_capacity(inputs.len());
        for (bytes, filename, options) in inputs {
            let pipeline = self.clone();
            handles.push(tokio::spawn(async move {
                pipeline.ingest_document(bytes, &filename, options).await
            }));
        }
        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "ingestion task panicked"),
            }
        }
        reports
    }

    /// Run one phase with timeout and retry. Retryable failures back
    /// off exponentially (base, 2x, 4x); terminal failures are recorded
    /// and returned.
    async fn run_phase<T, F, Fut>(
        &self,
        phase: &'static str,
        timeout_ms: u64,
        document_id: &DocumentId,
        mut attempt: F,
    ) -> Result<T, PhaseError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, IngestError>>,
    {
        let budget = Duration::from_millis(timeout_ms);
        let max_attempts = self.config.max_phase_retries.max(1);
        let mut last: Option<IngestError> = None;

        for retry in 0..max_attempts {
            if retry > 0 {
                let backoff = self.backoff_base * 2u32.pow(retry - 1);
                tokio::time::sleep(backoff).await;
            }

            let outcome = match tokio::time::timeout(budget, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(IngestError::Timeout {
                    phase,
                    seconds: budget.as_secs(),
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let kind = e.kind();
                    warn!(
                        document_id = %document_id,
                        phase,
                        attempt = retry + 1,
                        kind = %kind,
                        error = %e,
                        "phase failed"
                    );
                    let retryable = kind.retryable();
                    last = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let error = last.expect("at least one attempt ran");
        let kind = error.kind();
        self.error_log
            .record(document_id.as_str(), phase, kind, &error.to_string());
        Err(PhaseError {
            phase,
            kind,
            message: error.to_string(),
        })
    }

    /// Best-effort cascade delete after a terminal failure.
    async fn rollback(&self, document_id: &DocumentId) {
        if let Err(e) = self.store.delete_document_cascade(document_id) {
            warn!(document_id = %document_id, error = %e, "rollback failed");
        }
    }
}

/// Embed all chunk texts of one document in fixed-size batches.
fn embed_all(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(EMBED_BATCH.max(1)) {
        let refs: Vec<&str> = batch.iter().map(|s| s.as_str()).collect();
        let vectors = embedder.embed_batch(&refs)?;
        if vectors.len() != batch.len() {
            return Err(IngestError::Model(ModelError::EmptyResult));
        }
        out.extend(vectors);
    }
    Ok(out)
}
