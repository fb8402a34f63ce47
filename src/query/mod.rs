//! Query serving: planning, retrieval, reranking, citations.

pub mod citations;
pub mod deadline;
pub mod planner;
pub mod rerank;
pub mod retrievers;

pub use citations::{assemble_citations, Citation};
pub use deadline::QueryDeadline;
pub use planner::{QueryClass, QueryPlanner};
#[cfg(feature = "embeddings")]
pub use rerank::FastReranker;
pub use rerank::{rerank_candidates, OverlapReranker, Reranker};
pub use retrievers::{
    run_strategy, Candidate, RetrievalContext, Strategy,
};

use crate::store::SearchFilter;
use serde::{Deserialize, Serialize};

/// Hard ceiling on requested result counts.
pub const MAX_TOP_K: usize = 50;

/// Default result count.
pub const DEFAULT_TOP_K: usize = 5;

/// A search request as accepted by the engine.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub strategy: Strategy,
    pub top_k: usize,
    pub use_rerank: bool,
    pub filter: SearchFilter,
    /// Hierarchical citations include the division/category/product
    /// path.
    pub hierarchical: bool,
    /// Per-query deadline override in milliseconds; `None` uses the
    /// configured default.
    pub deadline_ms: Option<u64>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            strategy: Strategy::Hybrid,
            top_k: DEFAULT_TOP_K,
            use_rerank: true,
            filter: SearchFilter::default(),
            hierarchical: false,
            deadline_ms: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_rerank(mut self, use_rerank: bool) -> Self {
        self.use_rerank = use_rerank;
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn hierarchical(mut self) -> Self {
        self.hierarchical = true;
        self
    }

    pub fn with_deadline_ms(mut self, ms: u64) -> Self {
        self.deadline_ms = Some(ms);
        self
    }

    /// top_k clamped to [1, MAX_TOP_K].
    pub fn effective_top_k(&self) -> usize {
        self.top_k.clamp(1, MAX_TOP_K)
    }
}

/// A search response: ranked citations plus execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub citations: Vec<Citation>,
    pub total_candidates_considered: usize,
    pub elapsed_ms: u64,
    pub strategy_actually_used: String,
}
