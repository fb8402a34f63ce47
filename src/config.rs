//! Engine configuration.
//!
//! One `Config` value carries every tunable; constructed once and passed
//! into `Engine`. Loadable from a JSON file for the CLI.

use serde::{Deserialize, Serialize};

/// Weights for the post-retrieval fusion score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RerankWeights {
    pub cross_encoder: f32,
    pub retriever: f32,
    pub keyword: f32,
    pub query_type: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            cross_encoder: 0.5,
            retriever: 0.3,
            keyword: 0.1,
            query_type: 0.1,
        }
    }
}

/// Per-phase wall-clock budgets for document ingestion, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhaseTimeouts {
    pub extract_ms: u64,
    pub embed_ms: u64,
    pub entities_ms: u64,
    pub write_ms: u64,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            extract_ms: 600_000,
            embed_ms: 300_000,
            entities_ms: 120_000,
            write_ms: 60_000,
        }
    }
}

/// Post-write completeness thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum chunks-per-page ratio; catches silently truncated scans.
    pub min_chunk_page_ratio: f64,
    /// Minimum mean characters per page across all chunks.
    pub min_chars_per_page: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_chunk_page_ratio: 0.2,
            min_chars_per_page: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ingestion worker pool size. 0 means min(CPU, 8).
    pub workers: usize,
    pub chunk_target_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub chunk_max_tokens: usize,
    pub embedding_dim: usize,
    /// Entity pairs co-occurring in fewer chunks than this get no edge.
    pub cooccurrence_min_strength: u32,
    /// Louvain resolution, clamped to [0.5, 2.0].
    pub louvain_resolution: f64,
    pub rerank_weights: RerankWeights,
    pub query_deadline_ms: u64,
    pub ingest_phase_timeouts: PhaseTimeouts,
    pub validation: ValidationConfig,
    /// Quiet period with no document writes before a community rebuild
    /// may start, in milliseconds.
    pub community_dwell_ms: u64,
    /// Retries per ingestion phase before rollback.
    pub max_phase_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 0,
            chunk_target_tokens: 512,
            chunk_overlap_tokens: 128,
            chunk_max_tokens: 1024,
            embedding_dim: 384,
            cooccurrence_min_strength: 2,
            louvain_resolution: 1.0,
            rerank_weights: RerankWeights::default(),
            query_deadline_ms: 10_000,
            ingest_phase_timeouts: PhaseTimeouts::default(),
            validation: ValidationConfig::default(),
            community_dwell_ms: 60_000,
            max_phase_retries: 3,
        }
    }
}

impl Config {
    /// Resolved worker count: explicit value, else min(CPU, 8).
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            cpus.min(8)
        }
    }

    /// Louvain resolution clamped to its supported range.
    pub fn resolution(&self) -> f64 {
        self.louvain_resolution.clamp(0.5, 2.0)
    }
}
