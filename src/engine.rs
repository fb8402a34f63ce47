//! The engine: one process-wide value owning the store, the models,
//! and the ingestion pipeline.
//!
//! Construct once with `Engine::open` (or `open_in_memory`), customize
//! with the `with_*` builders, then `start()`. Transports call engine
//! methods; nothing reaches the store or pipeline directly. Models are
//! lazy: nothing loads until the first call that needs one.

use crate::community::{self, CommunityReport};
use crate::config::Config;
use crate::error::{EngineError, QueryError, StoreResult};
use crate::graph::DocumentId;
use crate::ingest::{
    Embedder, EntityExtractor, ErrorLog, ErrorRecord, HashEmbedder, IngestOptions, IngestPipeline,
    IngestReport, LopdfExtractor, PdfExtractor,
};
use crate::query::{
    assemble_citations, rerank_candidates, run_strategy, OverlapReranker, QueryDeadline,
    QueryPlanner, Reranker, RetrievalContext, SearchRequest, SearchResponse,
};
use crate::store::{export_graph, import_graph, GraphExport, GraphStore, SchemaSummary, SqliteStore};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Capability token for the raw graph query surface. Handed out
/// explicitly by the operator, never derived from a search request.
#[derive(Debug, Clone, Copy)]
pub struct RawAccess(());

impl RawAccess {
    /// Grant raw read/write access. Callers hold this apart from the
    /// search surface.
    pub fn grant() -> Self {
        Self(())
    }
}

pub struct Engine {
    store: Arc<dyn GraphStore>,
    config: Config,
    extractor: Arc<dyn PdfExtractor>,
    explicit_embedder: Option<Arc<dyn Embedder>>,
    explicit_reranker: Option<Arc<dyn Reranker>>,
    lazy_embedder: OnceLock<Arc<dyn Embedder>>,
    lazy_reranker: OnceLock<Arc<dyn Reranker>>,
    pipeline: OnceLock<Arc<IngestPipeline>>,
    entities: Arc<EntityExtractor>,
    planner: QueryPlanner,
    error_log: Arc<ErrorLog>,
    /// Advisory lock between ingestion writers and the community
    /// builder. Ingests hold the shared side; a rebuild takes the
    /// exclusive side, so neither runs while the other is active.
    community_lock: tokio::sync::RwLock<()>,
    active_ingests: AtomicUsize,
    last_write: Mutex<Instant>,
}

impl Engine {
    /// Open an engine over a database file.
    pub fn open(path: impl AsRef<Path>, config: Config) -> StoreResult<Self> {
        let store = SqliteStore::open(path, config.embedding_dim)?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// In-memory engine (tests, scratch work).
    pub fn open_in_memory(config: Config) -> StoreResult<Self> {
        let store = SqliteStore::open_in_memory(config.embedding_dim)?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Build over an existing store.
    pub fn with_store(store: Arc<dyn GraphStore>, config: Config) -> Self {
        let dwell = Duration::from_millis(config.community_dwell_ms);
        // A fresh engine has been quiescent "forever"; rebuilds may run
        // immediately.
        let last_write = Instant::now()
            .checked_sub(dwell)
            .unwrap_or_else(Instant::now);
        Self {
            store,
            config,
            extractor: Arc::new(LopdfExtractor::new()),
            explicit_embedder: None,
            explicit_reranker: None,
            lazy_embedder: OnceLock::new(),
            lazy_reranker: OnceLock::new(),
            pipeline: OnceLock::new(),
            entities: Arc::new(EntityExtractor::new()),
            planner: QueryPlanner::new(),
            error_log: Arc::new(ErrorLog::in_memory()),
            community_lock: tokio::sync::RwLock::new(()),
            active_ingests: AtomicUsize::new(0),
            last_write: Mutex::new(last_write),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.explicit_embedder = Some(embedder);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.explicit_reranker = Some(reranker);
        self
    }

    pub fn with_error_log(mut self, error_log: Arc<ErrorLog>) -> Self {
        self.error_log = error_log;
        self
    }

    /// Warm the lazy components so first requests don't pay model load
    /// time. Optional; everything also initializes on first use.
    pub fn start(&self) {
        let _ = self.embedder();
        let _ = self.reranker();
        info!("engine started");
    }

    /// Flush and stop. The store persists everything synchronously, so
    /// this is bookkeeping and a log line.
    pub fn shutdown(&self) {
        info!("engine shut down");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Resolve the embedder: explicit, then the feature-gated model,
    /// then the deterministic hash fallback.
    fn embedder(&self) -> Arc<dyn Embedder> {
        if let Some(embedder) = &self.explicit_embedder {
            return embedder.clone();
        }
        self.lazy_embedder
            .get_or_init(|| {
                #[cfg(feature = "embeddings")]
                {
                    match crate::ingest::FastEmbedder::default_model() {
                        Ok(model) => return Arc::new(model) as Arc<dyn Embedder>,
                        Err(e) => {
                            tracing::warn!(error = %e, "embedding model unavailable, using hash fallback")
                        }
                    }
                }
                Arc::new(HashEmbedder::new(self.config.embedding_dim)) as Arc<dyn Embedder>
            })
            .clone()
    }

    /// Resolve the reranker: explicit, then the feature-gated
    /// cross-encoder, then the lexical overlap fallback.
    fn reranker(&self) -> Arc<dyn Reranker> {
        if let Some(reranker) = &self.explicit_reranker {
            return reranker.clone();
        }
        self.lazy_reranker
            .get_or_init(|| {
                #[cfg(feature = "embeddings")]
                {
                    match crate::query::FastReranker::default_model() {
                        Ok(model) => return Arc::new(model) as Arc<dyn Reranker>,
                        Err(e) => {
                            tracing::warn!(error = %e, "reranker model unavailable, using overlap fallback")
                        }
                    }
                }
                Arc::new(OverlapReranker) as Arc<dyn Reranker>
            })
            .clone()
    }

    fn pipeline(&self) -> Arc<IngestPipeline> {
        self.pipeline
            .get_or_init(|| {
                // Query-side entity extraction shares the ingestion
                // extractor, so query entities resolve to graph keys.
                Arc::new(
                    IngestPipeline::new(
                        self.store.clone(),
                        self.extractor.clone(),
                        self.embedder(),
                        self.config.clone(),
                        self.error_log.clone(),
                    )
                    .with_entity_extractor(self.entities.clone()),
                )
            })
            .clone()
    }

    // === Ingestion ===

    /// Ingest one PDF byte stream. Waits for any running community
    /// rebuild to finish before writing.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        options: IngestOptions,
    ) -> IngestReport {
        self.active_ingests.fetch_add(1, Ordering::SeqCst);
        let report = {
            let _writers = self.community_lock.read().await;
            self.pipeline().ingest_document(bytes, filename, options).await
        };
        *self.last_write.lock().unwrap() = Instant::now();
        self.active_ingests.fetch_sub(1, Ordering::SeqCst);
        report
    }

    /// Ingest a batch concurrently over the worker pool. Like
    /// `ingest`, the batch holds the writer side of the community lock.
    pub async fn ingest_batch(
        &self,
        inputs: Vec<(Vec<u8>, String, IngestOptions)>,
    ) -> Vec<IngestReport> {
        self.active_ingests.fetch_add(1, Ordering::SeqCst);
        let reports = {
            let _writers = self.community_lock.read().await;
            self.pipeline().ingest_many(inputs).await
        };
        *self.last_write.lock().unwrap() = Instant::now();
        self.active_ingests.fetch_sub(1, Ordering::SeqCst);
        reports
    }

    // === Query ===

    /// Serve one search request.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, QueryError> {
        let started = Instant::now();
        let deadline_ms = request.deadline_ms.unwrap_or(self.config.query_deadline_ms);
        let deadline = QueryDeadline::from_millis(deadline_ms);
        let top_k = request.effective_top_k();

        if deadline.expired() {
            return Ok(SearchResponse {
                citations: Vec::new(),
                total_candidates_considered: 0,
                elapsed_ms: started.elapsed().as_millis() as u64,
                strategy_actually_used: "deadline".to_string(),
            });
        }

        let class = self.planner.classify(&request.query);
        let keywords = self.planner.extract_keywords(&request.query, class);

        let embedder = self.embedder();
        let ctx = RetrievalContext {
            store: self.store.as_ref(),
            embedder: Some(embedder.as_ref()),
            entities: self.entities.as_ref(),
            filter: &request.filter,
            deadline: &deadline,
        };

        let (candidates, mut strategy_used) =
            run_strategy(&ctx, request.strategy, &request.query, &keywords, top_k)?;
        let total_candidates_considered = candidates.len();

        let reranker = if request.use_rerank {
            Some(self.reranker())
        } else {
            None
        };
        let (ranked, reranked) = rerank_candidates(
            &request.query,
            class,
            &keywords,
            candidates,
            reranker.as_deref(),
            &self.config.rerank_weights,
            &deadline,
        );
        if request.use_rerank
            && !reranked
            && total_candidates_considered > 0
            && strategy_used != "deadline"
        {
            strategy_used.push_str("+pre-rerank");
        }

        let top: Vec<_> = ranked.into_iter().take(top_k).collect();
        let citations = assemble_citations(self.store.as_ref(), &top, request.hierarchical)?;

        Ok(SearchResponse {
            citations,
            total_candidates_considered,
            elapsed_ms: started.elapsed().as_millis() as u64,
            strategy_actually_used: strategy_used,
        })
    }

    // === Community overlay ===

    /// Rebuild the community overlay. Takes the exclusive side of the
    /// advisory lock, so it never runs concurrently with ingestion
    /// writers or another rebuild; ingests arriving meanwhile wait on
    /// the shared side. `force` overrides the dwell check only; the
    /// writer exclusion always holds.
    pub fn rebuild_communities(&self, force: bool) -> Result<CommunityReport, EngineError> {
        if self.active_ingests.load(Ordering::SeqCst) > 0 {
            return Err(EngineError::IngestActive);
        }
        let Ok(_guard) = self.community_lock.try_write() else {
            // Writers hold the shared side, or another rebuild the
            // exclusive one.
            if self.active_ingests.load(Ordering::SeqCst) > 0 {
                return Err(EngineError::IngestActive);
            }
            return Err(EngineError::CommunityLocked);
        };
        // An ingest may have slipped in between the check and the lock;
        // it is now parked on the shared side, but its graph writes have
        // not happened, so refuse rather than cluster a moving target.
        if self.active_ingests.load(Ordering::SeqCst) > 0 {
            return Err(EngineError::IngestActive);
        }

        if !force {
            let dwell = Duration::from_millis(self.config.community_dwell_ms);
            if self.last_write.lock().unwrap().elapsed() < dwell {
                return Err(EngineError::IngestActive);
            }
        }

        Ok(community::rebuild_communities(
            self.store.as_ref(),
            &self.config,
        )?)
    }

    /// Current communities and their sizes.
    pub fn communities(&self) -> StoreResult<Vec<crate::graph::Community>> {
        community::communities(self.store.as_ref())
    }

    // === Admin surfaces ===

    pub fn schema(&self) -> StoreResult<SchemaSummary> {
        self.store.schema_summary()
    }

    pub fn export(&self) -> StoreResult<GraphExport> {
        export_graph(self.store.as_ref())
    }

    pub fn import(&self, export: &GraphExport) -> StoreResult<()> {
        import_graph(self.store.as_ref(), export)
    }

    /// Raw read-only SQL, gated on the raw capability.
    pub fn raw_read(&self, _access: RawAccess, sql: &str) -> StoreResult<Vec<serde_json::Value>> {
        self.store.raw_read(sql)
    }

    /// Raw write SQL, gated on the raw capability.
    pub fn raw_execute(&self, _access: RawAccess, sql: &str) -> StoreResult<usize> {
        self.store.raw_execute(sql)
    }

    pub fn error_records(&self) -> Vec<ErrorRecord> {
        self.error_log.recent()
    }

    pub fn error_records_for(&self, document_id: &DocumentId) -> Vec<ErrorRecord> {
        self.error_log.for_document(document_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DocumentStatus;
    use crate::ingest::StaticExtractor;
    use crate::query::Strategy;

    const DIM: usize = 16;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.embedding_dim = DIM;
        config.workers = 2;
        config.community_dwell_ms = 0;
        config
    }

    fn engine_with_pages(pages: Vec<&str>) -> Engine {
        Engine::open_in_memory(test_config())
            .unwrap()
            .with_extractor(Arc::new(StaticExtractor::from_texts(pages)))
            .with_embedder(Arc::new(HashEmbedder::new(DIM)))
    }

    #[tokio::test]
    async fn ingest_then_search_round_trip() {
        let engine = engine_with_pages(vec![
            "An FX Forward is a contract to exchange currencies at a preset rate. \
             It is widely used for hedging future payment obligations.",
            "The option premium is payable two business days after the trade date. \
             Premiums vary with volatility and tenor.",
        ]);

        let report = engine
            .ingest(vec![], "fx_products.pdf", IngestOptions::default())
            .await;
        assert_eq!(report.status, DocumentStatus::Validated);

        let response = engine
            .search(&SearchRequest::new("What is an FX Forward?").with_strategy(Strategy::Hybrid))
            .unwrap();
        assert!(!response.citations.is_empty());
        assert_eq!(response.citations[0].document_name, "fx_products.pdf");
        assert!(response.citations[0].text.contains("FX Forward"));
        assert!(response.strategy_actually_used.starts_with("hybrid"));
    }

    #[tokio::test]
    async fn zero_deadline_returns_empty_with_marker() {
        let engine = engine_with_pages(vec!["Enough text to ingest a small document properly. \
             More words to cross the extraction threshold comfortably."]);
        engine
            .ingest(vec![], "doc.pdf", IngestOptions::default())
            .await;

        let response = engine
            .search(&SearchRequest::new("anything").with_deadline_ms(0))
            .unwrap();
        assert!(response.citations.is_empty());
        assert_eq!(response.strategy_actually_used, "deadline");
    }

    #[tokio::test]
    async fn zero_candidate_query_is_not_an_error() {
        let engine = engine_with_pages(vec!["Plain content about deposits and settlement dates \
             that satisfies the extraction minimum for a single page."]);
        engine
            .ingest(vec![], "doc.pdf", IngestOptions::default())
            .await;

        let response = engine
            .search(
                &SearchRequest::new("zzz qqq xxx")
                    .with_strategy(Strategy::Keyword)
                    .with_rerank(false),
            )
            .unwrap();
        assert!(response.citations.is_empty());
        // elapsed_ms is set even for empty results.
        assert!(response.total_candidates_considered == 0);
    }

    #[tokio::test]
    async fn community_rebuild_respects_lock_and_dwell() {
        let engine = engine_with_pages(vec![
            "The fx forward and option premium appear together in this text about hedging.",
            "The fx forward and option premium appear together again for co-occurrence.",
        ]);
        engine
            .ingest(vec![], "doc.pdf", IngestOptions::default())
            .await;

        // Dwell is zero in the test config, so a rebuild runs.
        let report = engine.rebuild_communities(false).unwrap();
        assert!(report.related_edges >= 1);

        // With a long dwell, an immediate rebuild is refused but force
        // overrides.
        let mut config = test_config();
        config.community_dwell_ms = 3_600_000;
        let slow = Engine::open_in_memory(config)
            .unwrap()
            .with_extractor(Arc::new(StaticExtractor::from_texts(vec![
                "The fx forward and option premium travel together across this page twice over.",
            ])))
            .with_embedder(Arc::new(HashEmbedder::new(DIM)));
        slow.ingest(vec![], "doc.pdf", IngestOptions::default()).await;

        assert!(matches!(
            slow.rebuild_communities(false),
            Err(EngineError::IngestActive)
        ));
        assert!(slow.rebuild_communities(true).is_ok());
    }

    #[tokio::test]
    async fn export_import_preserves_search_results() {
        let engine = engine_with_pages(vec![
            "An FX Forward is a contract to exchange currencies at a preset rate for hedging.",
        ]);
        engine
            .ingest(vec![], "source.pdf", IngestOptions::default())
            .await;

        let export = engine.export().unwrap();

        let restored = Engine::open_in_memory(test_config())
            .unwrap()
            .with_embedder(Arc::new(HashEmbedder::new(DIM)));
        restored.import(&export).unwrap();

        let request = SearchRequest::new("FX Forward contract")
            .with_strategy(Strategy::Keyword)
            .with_rerank(false);
        let original = engine.search(&request).unwrap();
        let after = restored.search(&request).unwrap();

        assert_eq!(original.citations.len(), after.citations.len());
        assert_eq!(
            original.citations[0].chunk_id,
            after.citations[0].chunk_id
        );
    }

    #[tokio::test]
    async fn raw_access_reads_the_graph() {
        let engine = engine_with_pages(vec!["A page about term deposits with enough text to \
             clear the minimum extraction threshold for one page."]);
        engine
            .ingest(vec![], "doc.pdf", IngestOptions::default())
            .await;

        let rows = engine
            .raw_read(RawAccess::grant(), "SELECT COUNT(*) AS n FROM documents")
            .unwrap();
        assert_eq!(rows[0]["n"], 1);
    }

    #[test]
    fn schema_reports_empty_store() {
        let engine = Engine::open_in_memory(test_config()).unwrap();
        let schema = engine.schema().unwrap();
        assert_eq!(schema.labels["Document"], 0);
        assert_eq!(schema.relationships["RELATED_TO"], 0);
    }
}
