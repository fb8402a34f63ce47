//! Shared helpers for integration tests: a synonym-aware deterministic
//! embedder, canned corpora, and engine construction.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use vellum::ingest::{HashEmbedder, StaticExtractor};
use vellum::{Config, Embedder, Engine, ModelError};

pub const DIM: usize = 32;

/// Deterministic embedder that canonicalizes synonyms before hashing,
/// so semantically related words ("reduce"/"lower") land on identical
/// vectors while staying batch-independent.
pub struct SynonymEmbedder {
    inner: HashEmbedder,
    synonyms: HashMap<&'static str, &'static str>,
}

impl SynonymEmbedder {
    pub fn new() -> Self {
        let mut synonyms = HashMap::new();
        synonyms.insert("reduce", "lower");
        synonyms.insert("reduces", "lower");
        synonyms.insert("reduced", "lower");
        synonyms.insert("lowered", "lower");
        synonyms.insert("lowering", "lower");
        synonyms.insert("decrease", "lower");
        synonyms.insert("premium", "upfront");
        synonyms.insert("premiums", "upfront");
        synonyms.insert("option", "hedge");
        synonyms.insert("options", "hedge");
        Self {
            inner: HashEmbedder::new(DIM),
            synonyms,
        }
    }

    fn canonicalize(&self, text: &str) -> String {
        text.split_whitespace()
            .map(|word| {
                let cleaned: String = word
                    .to_lowercase()
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect();
                self.synonyms
                    .get(cleaned.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or(cleaned)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Embedder for SynonymEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        let canonical: Vec<String> = texts.iter().map(|t| self.canonicalize(t)).collect();
        let refs: Vec<&str> = canonical.iter().map(|s| s.as_str()).collect();
        self.inner.embed_batch(&refs)
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.embedding_dim = DIM;
    config.workers = 2;
    config.community_dwell_ms = 0;
    config
}

/// Engine over an in-memory store with the synonym embedder and a
/// static page source standing in for the PDF parser.
pub fn engine_with_pages(pages: Vec<String>) -> Engine {
    Engine::open_in_memory(test_config())
        .unwrap()
        .with_extractor(Arc::new(StaticExtractor::from_texts(pages)))
        .with_embedder(Arc::new(SynonymEmbedder::new()))
}

/// A generic filler page that clears the extraction and validation
/// thresholds without mentioning any test-relevant vocabulary.
pub fn filler_page(n: u32) -> String {
    format!(
        "Page {n} describes general servicing arrangements. Statements are issued \
         quarterly and the relationship manager remains the first point of contact \
         for operational matters raised by the customer on this page."
    )
}

/// The 25-page FX product corpus: page 12 carries the definition
/// sentence, every other page is filler.
pub fn sample_fx_product_pages() -> Vec<String> {
    (1..=25)
        .map(|n| {
            if n == 12 {
                "An FX Forward is a contract to exchange currencies at a predetermined \
                 rate on a future date. Settlement occurs on the agreed value date and \
                 no amount is payable when the contract is entered."
                    .to_string()
            } else {
                filler_page(n)
            }
        })
        .collect()
}
