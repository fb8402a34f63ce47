//! Citation assembly.
//!
//! Each final candidate becomes a citation carrying document, page, and
//! chunk identity with its final score. Hierarchical mode prepends the
//! division > category > product > document path. No answer text is
//! synthesized.

use super::retrievers::Candidate;
use crate::error::StoreResult;
use crate::graph::EntityType;
use crate::store::GraphStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub document_name: String,
    pub page_num: u32,
    pub chunk_id: String,
    pub text: String,
    pub final_score: f32,
    pub source_tags: Vec<String>,
    /// `division > category > product > document`, hierarchical mode
    /// only; segments without data are omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<String>,
}

/// Turn ranked candidates into citations. `hierarchical` adds the
/// overlay path from document metadata and the chunk's strongest
/// product mention.
pub fn assemble_citations(
    store: &dyn GraphStore,
    candidates: &[Candidate],
    hierarchical: bool,
) -> StoreResult<Vec<Citation>> {
    let mut citations = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let document = store.load_document(&candidate.chunk.document_id)?;
        let document_name = document
            .as_ref()
            .map(|d| d.filename.clone())
            .unwrap_or_else(|| candidate.chunk.document_id.as_str().to_string());

        let hierarchy = if hierarchical {
            let mut segments: Vec<String> = Vec::new();
            if let Some(doc) = &document {
                if let Some(division) = &doc.division {
                    segments.push(division.clone());
                }
                if let Some(category) = &doc.category {
                    segments.push(category.clone());
                }
            }
            if let Some(product) = strongest_product(store, candidate)? {
                segments.push(product);
            }
            segments.push(document_name.clone());
            Some(segments.join(" > "))
        } else {
            None
        };

        citations.push(Citation {
            document_id: candidate.chunk.document_id.as_str().to_string(),
            document_name,
            page_num: candidate.chunk.page_num,
            chunk_id: candidate.chunk.id.as_str().to_string(),
            text: candidate.chunk.text.clone(),
            final_score: candidate.score,
            source_tags: candidate.source_tags.clone(),
            hierarchy,
        });
    }
    Ok(citations)
}

/// Highest-confidence PRODUCT mention of the chunk, if any.
fn strongest_product(store: &dyn GraphStore, candidate: &Candidate) -> StoreResult<Option<String>> {
    let mentions = store.mentions_for_chunk(&candidate.chunk.id)?;
    Ok(mentions
        .into_iter()
        .filter(|m| m.entity.entity_type == EntityType::Product)
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|m| m.entity.normalized))
}
