//! Retrieval strategies over the corpus graph.
//!
//! Every retriever returns normalized `Candidate` scores in [0, 1] and
//! checks the query deadline around store calls, returning whatever it
//! has when time runs out. The hybrid retriever fans out to keyword,
//! vector, and entity retrieval and fuses scores before reranking.

use super::deadline::QueryDeadline;
use crate::error::QueryError;
use crate::graph::{Chunk, ChunkId, EntityType};
use crate::ingest::embed::Embedder;
use crate::ingest::entities::EntityExtractor;
use crate::store::vector::dot;
use crate::store::{GraphStore, SearchFilter};
use std::collections::HashMap;

/// Pre-rerank fusion weights for the hybrid strategy.
const HYBRID_VECTOR_WEIGHT: f32 = 0.5;
const HYBRID_ENTITY_WEIGHT: f32 = 0.3;
const HYBRID_KEYWORD_WEIGHT: f32 = 0.2;

/// Phase-1 score floor for the community retriever.
const COMMUNITY_SCORE_FLOOR: f32 = 0.3;

/// Adjacency bonus when two query keywords appear as a phrase.
const PHRASE_BONUS: f32 = 0.1;

/// Retrieval strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Keyword,
    Vector,
    Entity,
    Hybrid,
    Community,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Keyword => "keyword",
            Strategy::Vector => "vector",
            Strategy::Entity => "entity",
            Strategy::Hybrid => "hybrid",
            Strategy::Community => "community",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keyword" => Some(Strategy::Keyword),
            "vector" => Some(Strategy::Vector),
            "entity" => Some(Strategy::Entity),
            "hybrid" => Some(Strategy::Hybrid),
            "community" => Some(Strategy::Community),
            _ => None,
        }
    }
}

/// A scored retrieval candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    pub score: f32,
    pub source_tags: Vec<String>,
}

/// Everything a retriever needs for one query.
pub struct RetrievalContext<'a> {
    pub store: &'a dyn GraphStore,
    pub embedder: Option<&'a dyn Embedder>,
    pub entities: &'a EntityExtractor,
    pub filter: &'a SearchFilter,
    pub deadline: &'a QueryDeadline,
}

/// Run the selected strategy. Returns the candidates and the strategy
/// actually used, which differs from the request when the pipeline
/// degrades (vector without an embedder falls back to keyword).
pub fn run_strategy(
    ctx: &RetrievalContext<'_>,
    strategy: Strategy,
    query: &str,
    keywords: &[String],
    top_k: usize,
) -> Result<(Vec<Candidate>, String), QueryError> {
    if ctx.deadline.expired() {
        return Ok((Vec::new(), "deadline".to_string()));
    }
    match strategy {
        Strategy::Keyword => Ok((
            keyword_retrieve(ctx, keywords, top_k)?,
            "keyword".to_string(),
        )),
        Strategy::Vector => match ctx.embedder {
            Some(embedder) => match vector_retrieve(ctx, embedder, query, top_k) {
                Ok(candidates) => Ok((candidates, "vector".to_string())),
                // Degrade within the query rather than fail.
                Err(QueryError::Model(_)) => Ok((
                    keyword_retrieve(ctx, keywords, top_k)?,
                    "keyword".to_string(),
                )),
                Err(e) => Err(e),
            },
            None => Ok((
                keyword_retrieve(ctx, keywords, top_k)?,
                "keyword".to_string(),
            )),
        },
        Strategy::Entity => Ok((entity_retrieve(ctx, query)?, "entity".to_string())),
        Strategy::Community => community_retrieve(ctx, query, keywords, top_k),
        Strategy::Hybrid => hybrid_retrieve(ctx, query, keywords, top_k),
    }
}

/// Keyword retrieval: OR over extracted keywords against the full-text
/// index. Score is matched-keyword ratio plus a small phrase-adjacency
/// bonus.
pub fn keyword_retrieve(
    ctx: &RetrievalContext<'_>,
    keywords: &[String],
    top_k: usize,
) -> Result<Vec<Candidate>, QueryError> {
    if keywords.is_empty() || ctx.deadline.expired() {
        return Ok(Vec::new());
    }
    let chunks = ctx
        .store
        .keyword_search_chunks(keywords, ctx.filter, top_k * 4)?;

    let mut candidates: Vec<Candidate> = chunks
        .into_iter()
        .map(|chunk| {
            let score = keyword_score(&chunk.text, keywords);
            Candidate {
                chunk,
                score,
                source_tags: vec!["keyword".to_string()],
            }
        })
        .collect();
    sort_candidates(&mut candidates);
    candidates.truncate(top_k * 2);
    Ok(candidates)
}

fn keyword_score(text: &str, keywords: &[String]) -> f32 {
    let lower = text.to_lowercase();
    let matched = keywords.iter().filter(|k| lower.contains(*k)).count();
    let mut score = matched as f32 / keywords.len() as f32;

    // Phrase adjacency: two consecutive query keywords as one phrase.
    for pair in keywords.windows(2) {
        if lower.contains(&format!("{} {}", pair[0], pair[1])) {
            score += PHRASE_BONUS;
            break;
        }
    }
    score.clamp(0.0, 1.0)
}

/// Vector retrieval: ANN top-(2·top_k) on the query embedding; cosine
/// similarity clipped to [0, 1].
pub fn vector_retrieve(
    ctx: &RetrievalContext<'_>,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
) -> Result<Vec<Candidate>, QueryError> {
    if ctx.deadline.expired() {
        return Ok(Vec::new());
    }
    let embedding = embedder.embed_one(query)?;
    if ctx.deadline.expired() {
        return Ok(Vec::new());
    }
    let hits = ctx
        .store
        .vector_search_chunks(&embedding, top_k * 2, ctx.filter)?;
    Ok(hits
        .into_iter()
        .map(|(chunk, similarity)| Candidate {
            chunk,
            score: similarity.clamp(0.0, 1.0),
            source_tags: vec!["vector".to_string()],
        })
        .collect())
}

/// Entity retrieval: extract PRODUCT/TERM entities from the query with
/// the ingestion extractor, fetch their containing chunks, and score by
/// normalized confidence sums.
pub fn entity_retrieve(
    ctx: &RetrievalContext<'_>,
    query: &str,
) -> Result<Vec<Candidate>, QueryError> {
    if ctx.deadline.expired() {
        return Ok(Vec::new());
    }
    let query_entities: Vec<_> = ctx
        .entities
        .extract(query)
        .into_iter()
        .filter(|e| {
            matches!(
                e.key.entity_type,
                EntityType::Product | EntityType::Term
            )
        })
        .collect();
    if query_entities.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_chunk: HashMap<ChunkId, Candidate> = HashMap::new();
    for entity in &query_entities {
        if ctx.deadline.expired() {
            break;
        }
        for (chunk, confidence) in ctx.store.chunks_containing(&entity.key, ctx.filter)? {
            by_chunk
                .entry(chunk.id.clone())
                .and_modify(|c| c.score += confidence)
                .or_insert(Candidate {
                    chunk,
                    score: confidence,
                    source_tags: vec!["entity".to_string()],
                });
        }
    }

    let mut candidates: Vec<Candidate> = by_chunk.into_values().collect();
    let max = candidates.iter().map(|c| c.score).fold(0.0f32, f32::max);
    if max > 0.0 {
        for c in candidates.iter_mut() {
            c.score /= max;
        }
    }
    sort_candidates(&mut candidates);
    Ok(candidates)
}

/// Community-aware two-phase retrieval. Phase 1 searches chunks whose
/// entities lie in the query entities' communities; if fewer than
/// `top_k` candidates clear the score floor, phase 2 expands through
/// bridge nodes connecting those communities.
pub fn community_retrieve(
    ctx: &RetrievalContext<'_>,
    query: &str,
    keywords: &[String],
    top_k: usize,
) -> Result<(Vec<Candidate>, String), QueryError> {
    if ctx.deadline.expired() {
        return Ok((Vec::new(), "deadline".to_string()));
    }

    // Candidate communities: union over the query's entities.
    let mut communities: Vec<i64> = Vec::new();
    for entity in ctx.entities.extract(query) {
        if let Some(stored) = ctx.store.entity_lookup(&entity.key)? {
            if let Some(community) = stored.community_id {
                if !communities.contains(&community) {
                    communities.push(community);
                }
            }
        }
    }
    if communities.is_empty() {
        // No community signal; keyword retrieval is the honest answer.
        return Ok((
            keyword_retrieve(ctx, keywords, top_k)?,
            "keyword".to_string(),
        ));
    }

    let score_chunk = |chunk: &Chunk, query_vec: &Option<Vec<f32>>| -> f32 {
        match query_vec {
            Some(v) if !chunk.embedding.is_empty() => dot(v, &chunk.embedding).clamp(0.0, 1.0),
            _ => keyword_score(&chunk.text, keywords),
        }
    };
    let query_vec = match ctx.embedder {
        Some(embedder) => embedder.embed_one(query).ok(),
        None => None,
    };

    // Phase 1: within the candidate communities.
    let phase1 = ctx
        .store
        .chunks_in_communities(&communities, ctx.filter, top_k * 4)?;
    let mut candidates: Vec<Candidate> = phase1
        .into_iter()
        .map(|chunk| {
            let score = score_chunk(&chunk, &query_vec);
            Candidate {
                chunk,
                score,
                source_tags: vec!["community".to_string()],
            }
        })
        .collect();

    let above_floor = candidates
        .iter()
        .filter(|c| c.score >= COMMUNITY_SCORE_FLOOR)
        .count();
    let mut used = "community".to_string();

    // Phase 2: bridge expansion when phase 1 comes up short.
    if above_floor < top_k && !ctx.deadline.expired() {
        let seen: std::collections::HashSet<ChunkId> =
            candidates.iter().map(|c| c.chunk.id.clone()).collect();
        for chunk in ctx.store.bridge_chunks(&communities, ctx.filter, top_k * 2)? {
            if seen.contains(&chunk.id) {
                continue;
            }
            let score = score_chunk(&chunk, &query_vec);
            candidates.push(Candidate {
                chunk,
                score,
                source_tags: vec!["community-bridge".to_string()],
            });
        }
        used = "community-two-phase".to_string();
    }

    sort_candidates(&mut candidates);
    candidates.truncate(top_k * 2);
    Ok((candidates, used))
}

/// Hybrid retrieval: fan out to keyword, vector, and entity, then fuse
/// scores (vector 0.5, entity 0.3, keyword 0.2) over the candidate
/// union. The caller reranks afterwards.
pub fn hybrid_retrieve(
    ctx: &RetrievalContext<'_>,
    query: &str,
    keywords: &[String],
    top_k: usize,
) -> Result<(Vec<Candidate>, String), QueryError> {
    let keyword = keyword_retrieve(ctx, keywords, top_k)?;
    let vector = match ctx.embedder {
        Some(embedder) => match vector_retrieve(ctx, embedder, query, top_k) {
            Ok(candidates) => Some(candidates),
            // Model trouble degrades hybrid to its lexical half.
            Err(QueryError::Model(_)) => None,
            Err(e) => return Err(e),
        },
        None => None,
    };
    let entity = entity_retrieve(ctx, query)?;

    let mut fused: HashMap<ChunkId, Candidate> = HashMap::new();
    let mut merge = |candidates: Vec<Candidate>, weight: f32, tag: &str| {
        for candidate in candidates {
            let weighted = candidate.score * weight;
            match fused.get_mut(&candidate.chunk.id) {
                Some(existing) => {
                    existing.score += weighted;
                    if !existing.source_tags.iter().any(|t| t == tag) {
                        existing.source_tags.push(tag.to_string());
                    }
                }
                None => {
                    fused.insert(
                        candidate.chunk.id.clone(),
                        Candidate {
                            chunk: candidate.chunk,
                            score: weighted,
                            source_tags: vec![tag.to_string()],
                        },
                    );
                }
            }
        }
    };

    let used = match &vector {
        Some(_) => "hybrid",
        None => "hybrid-lexical",
    };
    merge(keyword, HYBRID_KEYWORD_WEIGHT, "keyword");
    if let Some(vector) = vector {
        merge(vector, HYBRID_VECTOR_WEIGHT, "vector");
    }
    merge(entity, HYBRID_ENTITY_WEIGHT, "entity");

    let mut candidates: Vec<Candidate> = fused.into_values().collect();
    sort_candidates(&mut candidates);
    candidates.truncate(top_k * 2);
    Ok((candidates, used.to_string()))
}

/// Descending score, then chunk id for a stable total order.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}
