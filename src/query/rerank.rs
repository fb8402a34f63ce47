//! Cross-encoder reranking and multi-factor score fusion.
//!
//! `final = 0.5·cross_encoder + 0.3·retriever + 0.1·keyword_match +
//! 0.1·query_type_match`, ties broken by higher semantic density then
//! lower page number. The reranker degrades gracefully: a missed
//! deadline or an unavailable model returns the candidates in their
//! pre-rerank order, never an empty list.

use super::deadline::QueryDeadline;
use super::planner::QueryClass;
use super::retrievers::{sort_candidates, Candidate};
use crate::config::RerankWeights;
use crate::error::ModelError;
use std::collections::HashSet;

/// Joint (query, text) relevance scorer in [0, 1].
pub trait Reranker: Send + Sync {
    fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, ModelError>;
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::*;
    use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
    use std::sync::Mutex;

    /// Cross-encoder backed by fastembed's reranker models.
    pub struct FastReranker {
        model: Mutex<TextRerank>,
    }

    impl FastReranker {
        pub fn new(model: RerankerModel) -> Result<Self, ModelError> {
            let options = RerankInitOptions::new(model).with_show_download_progress(false);
            let reranker = TextRerank::try_new(options)
                .map_err(|e| ModelError::Unavailable(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(reranker),
            })
        }

        /// The reference model: bge-reranker-base.
        pub fn default_model() -> Result<Self, ModelError> {
            Self::new(RerankerModel::BGERerankerBase)
        }
    }

    impl Reranker for FastReranker {
        fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, ModelError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self.model.lock().unwrap();
            let results = model
                .rerank(query, texts.to_vec(), false, None)
                .map_err(|e| ModelError::Unavailable(e.to_string()))?;
            // fastembed returns results sorted by score with the source
            // index attached; restore input order.
            let mut scores = vec![0.0f32; texts.len()];
            for r in results {
                // Squash raw logits into [0, 1].
                scores[r.index] = 1.0 / (1.0 + (-r.score).exp());
            }
            Ok(scores)
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastReranker;

/// Deterministic lexical cross-scorer: token overlap between query and
/// text. The no-model fallback and the test baseline.
pub struct OverlapReranker;

impl Reranker for OverlapReranker {
    fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, ModelError> {
        let query_tokens: HashSet<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Ok(texts
            .iter()
            .map(|text| {
                if query_tokens.is_empty() {
                    return 0.0;
                }
                let text_tokens: HashSet<String> = text
                    .to_lowercase()
                    .split_whitespace()
                    .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
                    .collect();
                let matched = query_tokens.intersection(&text_tokens).count();
                matched as f32 / query_tokens.len() as f32
            })
            .collect())
    }
}

/// Jaccard overlap of query keywords with the chunk's keyword set.
fn keyword_overlap(query_keywords: &[String], chunk_keywords: &[String]) -> f32 {
    if query_keywords.is_empty() || chunk_keywords.is_empty() {
        return 0.0;
    }
    let a: HashSet<&str> = query_keywords.iter().map(|s| s.as_str()).collect();
    let b: HashSet<&str> = chunk_keywords.iter().map(|s| s.as_str()).collect();
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f32 / union as f32
}

/// Rerank candidates in place of their retrieval order. Returns the
/// ranked list and whether the cross-encoder actually ran.
pub fn rerank_candidates(
    query: &str,
    class: QueryClass,
    query_keywords: &[String],
    mut candidates: Vec<Candidate>,
    reranker: Option<&dyn Reranker>,
    weights: &RerankWeights,
    deadline: &QueryDeadline,
) -> (Vec<Candidate>, bool) {
    if candidates.is_empty() {
        return (candidates, false);
    }

    // Pre-rerank order is the fallback for every degradation path.
    sort_candidates(&mut candidates);

    let Some(reranker) = reranker else {
        return (candidates, false);
    };
    if deadline.expired() {
        return (candidates, false);
    }

    let texts: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
    let cross_scores = match reranker.score_batch(query, &texts) {
        Ok(scores) if scores.len() == texts.len() => scores,
        // Model trouble: keep the pre-rerank ranking.
        _ => return (candidates, false),
    };
    if deadline.expired() {
        return (candidates, false);
    }

    let preferred = class.preferred_chunk_type();
    let mut scored: Vec<(f32, Candidate)> = candidates
        .into_iter()
        .zip(cross_scores)
        .map(|(candidate, cross)| {
            let type_match = match preferred {
                Some(t) if candidate.chunk.chunk_type == t => 1.0,
                _ => 0.0,
            };
            let final_score = weights.cross_encoder * cross.clamp(0.0, 1.0)
                + weights.retriever * candidate.score
                + weights.keyword * keyword_overlap(query_keywords, &candidate.chunk.keywords)
                + weights.query_type * type_match;
            (final_score, candidate)
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            // Ties: richer chunks first, then earlier in the document.
            .then_with(|| {
                b.chunk
                    .semantic_density
                    .partial_cmp(&a.chunk.semantic_density)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.chunk.page_num.cmp(&b.chunk.page_num))
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });

    let ranked = scored
        .into_iter()
        .map(|(final_score, mut candidate)| {
            candidate.score = final_score;
            candidate
        })
        .collect();
    (ranked, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Chunk, ChunkId, ChunkType, DocumentId};

    fn candidate(index: u32, text: &str, score: f32, chunk_type: ChunkType) -> Candidate {
        let doc = DocumentId::from_string("doc");
        Candidate {
            chunk: Chunk {
                id: ChunkId::new(&doc, index),
                document_id: doc,
                text: text.to_string(),
                page_num: index + 1,
                chunk_index: index,
                token_count: text.split_whitespace().count() as u32,
                embedding: Vec::new(),
                semantic_density: 0.5,
                chunk_type,
                has_definitions: chunk_type == ChunkType::Definition,
                has_examples: false,
                keywords: text
                    .split_whitespace()
                    .filter(|w| w.len() > 3)
                    .map(|w| w.to_lowercase())
                    .collect(),
            },
            score,
            source_tags: vec!["test".to_string()],
        }
    }

    #[test]
    fn overlap_reranker_scores_shared_tokens() {
        let scores = OverlapReranker
            .score_batch(
                "reduce option premium",
                &["you can lower the option premium", "unrelated text entirely"],
            )
            .unwrap();
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn rerank_prefers_cross_encoder_match() {
        let candidates = vec![
            candidate(0, "completely different topic words", 0.9, ChunkType::Content),
            candidate(1, "the option premium can be lowered", 0.5, ChunkType::Content),
        ];
        let (ranked, reranked) = rerank_candidates(
            "lower option premium",
            QueryClass::General,
            &["lower".into(), "option".into(), "premium".into()],
            candidates,
            Some(&OverlapReranker),
            &RerankWeights::default(),
            &QueryDeadline::none(),
        );
        assert!(reranked);
        assert!(ranked[0].chunk.text.contains("premium"));
    }

    #[test]
    fn no_reranker_keeps_pre_rerank_order() {
        let candidates = vec![
            candidate(0, "b", 0.2, ChunkType::Content),
            candidate(1, "a", 0.8, ChunkType::Content),
        ];
        let (ranked, reranked) = rerank_candidates(
            "query",
            QueryClass::General,
            &[],
            candidates,
            None,
            &RerankWeights::default(),
            &QueryDeadline::none(),
        );
        assert!(!reranked);
        assert!(ranked[0].score > ranked[1].score);
    }

    // === Scenario: deadline mid-rerank degrades, never empties ===

    #[test]
    fn expired_deadline_returns_pre_rerank_order() {
        let candidates = vec![
            candidate(0, "first", 0.3, ChunkType::Content),
            candidate(1, "second", 0.7, ChunkType::Content),
        ];
        let (ranked, reranked) = rerank_candidates(
            "query",
            QueryClass::General,
            &[],
            candidates,
            Some(&OverlapReranker),
            &RerankWeights::default(),
            &QueryDeadline::from_millis(0),
        );
        assert!(!reranked);
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn query_type_match_breaks_near_ties() {
        // Same text, same retriever score; only the chunk type differs.
        let candidates = vec![
            candidate(0, "a premium applies to this product", 0.5, ChunkType::Content),
            candidate(1, "a premium applies to this product", 0.5, ChunkType::Definition),
        ];
        let (ranked, _) = rerank_candidates(
            "what is a premium",
            QueryClass::Definition,
            &["premium".into()],
            candidates,
            Some(&OverlapReranker),
            &RerankWeights::default(),
            &QueryDeadline::none(),
        );
        assert_eq!(ranked[0].chunk.chunk_type, ChunkType::Definition);
    }

    #[test]
    fn tie_breaks_by_density_then_page() {
        let mut a = candidate(0, "same text here", 0.5, ChunkType::Content);
        let mut b = candidate(1, "same text here", 0.5, ChunkType::Content);
        a.chunk.semantic_density = 0.4;
        b.chunk.semantic_density = 0.9;
        // b has higher density but later page; density wins first.
        let (ranked, _) = rerank_candidates(
            "same text",
            QueryClass::General,
            &[],
            vec![a, b],
            Some(&OverlapReranker),
            &RerankWeights::default(),
            &QueryDeadline::none(),
        );
        assert!(ranked[0].chunk.semantic_density > 0.8);
    }

    #[test]
    fn keyword_overlap_is_jaccard() {
        assert_eq!(keyword_overlap(&[], &[]), 0.0);
        let overlap = keyword_overlap(
            &["premium".into(), "option".into()],
            &["premium".into(), "settlement".into(), "option".into()],
        );
        // |{premium, option}| / |{premium, option, settlement}| = 2/3.
        assert!((overlap - 2.0 / 3.0).abs() < 1e-6);
    }
}
