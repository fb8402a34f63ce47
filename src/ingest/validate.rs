//! Post-write completeness validation.
//!
//! All four criteria must hold or the document is rolled back:
//! at least one chunk; chunks-per-page ratio at or above the floor;
//! every page covered by a chunk; mean characters per page at or above
//! the content threshold.

use crate::config::ValidationConfig;
use crate::graph::Chunk;
use std::collections::HashSet;

/// The reason a document failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    NoChunks,
    LowChunkRatio { chunks: usize, pages: u32, ratio: f64 },
    UncoveredPages { pages: Vec<u32> },
    ThinContent { chars_per_page: f64 },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::NoChunks => write!(f, "document produced no chunks"),
            ValidationIssue::LowChunkRatio { chunks, pages, ratio } => write!(
                f,
                "only {chunks} chunks for {pages} pages (ratio {ratio:.3})"
            ),
            ValidationIssue::UncoveredPages { pages } => {
                write!(f, "pages without chunks: {pages:?}")
            }
            ValidationIssue::ThinContent { chars_per_page } => {
                write!(f, "mean {chars_per_page:.0} chars per page is below threshold")
            }
        }
    }
}

/// Check the completeness criteria for a freshly written document.
pub fn validate_document(
    total_pages: u32,
    chunks: &[Chunk],
    config: &ValidationConfig,
) -> Result<(), ValidationIssue> {
    if chunks.is_empty() {
        return Err(ValidationIssue::NoChunks);
    }

    let pages = total_pages.max(1);
    let ratio = chunks.len() as f64 / pages as f64;
    if ratio < config.min_chunk_page_ratio {
        return Err(ValidationIssue::LowChunkRatio {
            chunks: chunks.len(),
            pages,
            ratio,
        });
    }

    let covered: HashSet<u32> = chunks.iter().map(|c| c.page_num).collect();
    let missing: Vec<u32> = (1..=pages).filter(|p| !covered.contains(p)).collect();
    if !missing.is_empty() {
        return Err(ValidationIssue::UncoveredPages { pages: missing });
    }

    let total_chars: usize = chunks.iter().map(|c| c.text.len()).sum();
    let chars_per_page = total_chars as f64 / pages as f64;
    if chars_per_page < config.min_chars_per_page {
        return Err(ValidationIssue::ThinContent { chars_per_page });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ChunkId, ChunkType, DocumentId};

    fn chunk(doc: &DocumentId, index: u32, page: u32, chars: usize) -> Chunk {
        Chunk {
            id: ChunkId::new(doc, index),
            document_id: doc.clone(),
            text: "x".repeat(chars),
            page_num: page,
            chunk_index: index,
            token_count: 10,
            embedding: Vec::new(),
            semantic_density: 0.5,
            chunk_type: ChunkType::Content,
            has_definitions: false,
            has_examples: false,
            keywords: Vec::new(),
        }
    }

    fn config() -> ValidationConfig {
        ValidationConfig::default()
    }

    #[test]
    fn healthy_document_passes() {
        let doc = DocumentId::from_string("ok");
        let chunks = vec![chunk(&doc, 0, 1, 300), chunk(&doc, 1, 2, 300)];
        assert!(validate_document(2, &chunks, &config()).is_ok());
    }

    #[test]
    fn no_chunks_fails() {
        assert_eq!(
            validate_document(5, &[], &config()),
            Err(ValidationIssue::NoChunks)
        );
    }

    // === Scenario: 76-page scan yielding 2 chunks is rejected ===

    #[test]
    fn truncated_scan_fails_ratio() {
        let doc = DocumentId::from_string("scan");
        let chunks = vec![chunk(&doc, 0, 1, 300), chunk(&doc, 1, 2, 300)];
        let err = validate_document(76, &chunks, &config()).unwrap_err();
        assert!(matches!(err, ValidationIssue::LowChunkRatio { .. }));
    }

    #[test]
    fn uncovered_page_fails() {
        let doc = DocumentId::from_string("gap");
        // Page 2 of 3 has no chunk.
        let chunks = vec![
            chunk(&doc, 0, 1, 300),
            chunk(&doc, 1, 3, 300),
        ];
        let err = validate_document(3, &chunks, &config()).unwrap_err();
        assert_eq!(err, ValidationIssue::UncoveredPages { pages: vec![2] });
    }

    #[test]
    fn thin_content_fails() {
        let doc = DocumentId::from_string("thin");
        let chunks = vec![chunk(&doc, 0, 1, 20), chunk(&doc, 1, 2, 20)];
        let err = validate_document(2, &chunks, &config()).unwrap_err();
        assert!(matches!(err, ValidationIssue::ThinContent { .. }));
    }
}
