//! Entity extraction: pattern library, numeric extractors, and a
//! pluggable statistical NER backend.
//!
//! Per-chunk output is deduplicated on `(normalized, type)` keeping the
//! highest confidence. Cross-chunk deduplication happens at the store
//! via entity upserts.
//!
//! Fixed source confidences: statistical NER 0.90, curated patterns
//! 0.85, numeric extractors 0.95.

use super::patterns::{canonical_product, PRODUCT_PATTERNS, TERM_PATTERNS};
use crate::graph::{EntityKey, EntityType};
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

pub const CONFIDENCE_NER: f32 = 0.90;
pub const CONFIDENCE_PATTERN: f32 = 0.85;
pub const CONFIDENCE_NUMERIC: f32 = 0.95;

/// One extracted mention with its span in the source text.
#[derive(Debug, Clone)]
pub struct ExtractedEntity {
    pub surface: String,
    pub key: EntityKey,
    pub confidence: f32,
    pub start: usize,
    pub end: usize,
}

/// A span found by the statistical NER backend.
#[derive(Debug, Clone)]
pub struct NerSpan {
    pub surface: String,
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
}

/// Statistical named-entity recognition. The default backend is a
/// deterministic heuristic; deployments can wrap a native model runtime
/// or an external inference endpoint instead.
pub trait NerBackend: Send + Sync {
    fn extract(&self, text: &str) -> Vec<NerSpan>;
}

/// High-precision heuristic NER: organizations by capitalized phrases
/// ending in a corporate suffix, persons by honorific-led names.
pub struct HeuristicNer {
    org_re: Regex,
    person_re: Regex,
}

impl HeuristicNer {
    pub fn new() -> Self {
        Self {
            org_re: Regex::new(
                r"\b(?:[A-Z][A-Za-z&]+\s+){0,4}(?:Bank|Ltd|Limited|Inc|Corp|Corporation|Group|Holdings|Plc|LLC|AG|SA|Pty|Trust|Fund|Authority|Commission|Exchange)\b",
            )
            .unwrap(),
            person_re: Regex::new(
                r"\b(?:Mr|Ms|Mrs|Dr|Prof)\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\b",
            )
            .unwrap(),
        }
    }
}

impl Default for HeuristicNer {
    fn default() -> Self {
        Self::new()
    }
}

impl NerBackend for HeuristicNer {
    fn extract(&self, text: &str) -> Vec<NerSpan> {
        let mut spans = Vec::new();
        for m in self.org_re.find_iter(text) {
            spans.push(NerSpan {
                surface: m.as_str().to_string(),
                entity_type: EntityType::Org,
                start: m.start(),
                end: m.end(),
            });
        }
        for caps in self.person_re.captures_iter(text) {
            if let Some(name) = caps.get(1) {
                spans.push(NerSpan {
                    surface: name.as_str().to_string(),
                    entity_type: EntityType::Person,
                    start: name.start(),
                    end: name.end(),
                });
            }
        }
        spans
    }
}

/// Normalize a surface form: casefold, strip punctuation except `/` and
/// `-`, collapse whitespace.
pub fn normalize_surface(surface: &str) -> String {
    let lowered = surface.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '/' || c == '-' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pattern + statistical + numeric entity extraction over chunk text.
pub struct EntityExtractor {
    product_re: Regex,
    term_re: Regex,
    amount_re: Regex,
    percent_re: Regex,
    ner: Box<dyn NerBackend>,
}

/// Build one case-insensitive alternation over the phrase list, whole
/// words, optional plural on the final word.
fn phrase_alternation(phrases: &[&str]) -> Regex {
    let mut alternatives: Vec<String> = phrases
        .iter()
        .map(|p| regex::escape(p).replace(r"\ ", r"\s+"))
        .collect();
    // Longer phrases first so "interest rate swap" beats "interest rate".
    alternatives.sort_by_key(|a| std::cmp::Reverse(a.len()));
    let pattern = format!(r"\b(?:{})s?\b", alternatives.join("|"));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .expect("phrase library must compile")
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self::with_ner(Box::new(HeuristicNer::new()))
    }

    pub fn with_ner(ner: Box<dyn NerBackend>) -> Self {
        Self {
            product_re: phrase_alternation(PRODUCT_PATTERNS),
            term_re: phrase_alternation(TERM_PATTERNS),
            amount_re: Regex::new(
                r"(?i)(?:\$|AUD|USD|EUR|GBP|NZD|JPY|€|£|¥)\s?\d[\d,]*(?:\.\d+)?(?:\s?(?:million|billion|thousand|m|bn|k)\b)?",
            )
            .unwrap(),
            percent_re: Regex::new(r"(?i)\d[\d,]*(?:\.\d+)?\s?(?:%|percent|per cent|basis points|bps)")
                .unwrap(),
            ner,
        }
    }

    /// Extract all entities from one chunk of text. No duplicates: the
    /// same `(normalized, type)` collapses to its highest confidence.
    pub fn extract(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut found: Vec<ExtractedEntity> = Vec::new();

        let mut product_spans: Vec<(usize, usize)> = Vec::new();
        for m in self.product_re.find_iter(text) {
            let surface = m.as_str();
            let normalized = normalize_product(surface);
            product_spans.push((m.start(), m.end()));
            found.push(ExtractedEntity {
                surface: surface.to_string(),
                key: EntityKey::new(normalized, EntityType::Product),
                confidence: CONFIDENCE_PATTERN,
                start: m.start(),
                end: m.end(),
            });
        }
        // A term inside a product phrase is part of the product, not a
        // separate mention ("interest rate" within "interest rate swap").
        let inside_product = |start: usize, end: usize| {
            product_spans.iter().any(|&(s, e)| start >= s && end <= e)
        };

        for m in self.term_re.find_iter(text) {
            if inside_product(m.start(), m.end()) {
                continue;
            }
            let surface = m.as_str();
            found.push(ExtractedEntity {
                surface: surface.to_string(),
                key: EntityKey::new(normalize_term(surface), EntityType::Term),
                confidence: CONFIDENCE_PATTERN,
                start: m.start(),
                end: m.end(),
            });
        }

        for m in self.amount_re.find_iter(text) {
            found.push(ExtractedEntity {
                surface: m.as_str().to_string(),
                key: EntityKey::new(normalize_surface(m.as_str()), EntityType::Amount),
                confidence: CONFIDENCE_NUMERIC,
                start: m.start(),
                end: m.end(),
            });
        }

        for m in self.percent_re.find_iter(text) {
            found.push(ExtractedEntity {
                surface: m.as_str().to_string(),
                key: EntityKey::new(normalize_surface(m.as_str()), EntityType::Percent),
                confidence: CONFIDENCE_NUMERIC,
                start: m.start(),
                end: m.end(),
            });
        }

        for span in self.ner.extract(text) {
            let normalized = normalize_surface(&span.surface);
            if normalized.is_empty() {
                continue;
            }
            let key = match span.entity_type {
                // MONEY from a statistical model lands as AMOUNT.
                EntityType::Amount | EntityType::Percent | EntityType::Org
                | EntityType::Person | EntityType::Product => {
                    EntityKey::new(normalized, span.entity_type)
                }
                _ => EntityKey::new(normalized, EntityType::Other),
            };
            found.push(ExtractedEntity {
                surface: span.surface,
                key,
                confidence: CONFIDENCE_NER,
                start: span.start,
                end: span.end,
            });
        }

        dedup_by_key(found)
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize then fold product aliases onto canonical ids. Singular and
/// plural surfaces map to the same entity; a trailing `s` is stripped
/// only when the singular names a library phrase.
fn normalize_product(surface: &str) -> String {
    let normalized = normalize_surface(surface);
    if let Some(canonical) = canonical_product(&normalized) {
        return canonical.to_string();
    }
    if PRODUCT_PATTERNS.contains(&normalized.as_str()) {
        return normalized;
    }
    if let Some(stripped) = normalized.strip_suffix('s') {
        if let Some(canonical) = canonical_product(stripped) {
            return canonical.to_string();
        }
        if PRODUCT_PATTERNS.contains(&stripped) {
            return stripped.to_string();
        }
    }
    normalized
}

fn normalize_term(surface: &str) -> String {
    let normalized = normalize_surface(surface);
    if TERM_PATTERNS.contains(&normalized.as_str()) {
        return normalized;
    }
    if let Some(stripped) = normalized.strip_suffix('s') {
        if TERM_PATTERNS.contains(&stripped) {
            return stripped.to_string();
        }
    }
    normalized
}

/// Collapse duplicate `(normalized, type)` mentions, keeping the
/// maximum confidence and the earliest span.
fn dedup_by_key(found: Vec<ExtractedEntity>) -> Vec<ExtractedEntity> {
    let mut by_key: HashMap<EntityKey, ExtractedEntity> = HashMap::new();
    for entity in found {
        match by_key.get_mut(&entity.key) {
            Some(existing) => {
                if entity.confidence > existing.confidence {
                    existing.confidence = entity.confidence;
                }
                if entity.start < existing.start {
                    existing.start = entity.start;
                    existing.end = entity.end;
                    existing.surface = entity.surface;
                }
            }
            None => {
                by_key.insert(entity.key.clone(), entity);
            }
        }
    }
    let mut out: Vec<ExtractedEntity> = by_key.into_values().collect();
    out.sort_by_key(|e| (e.start, e.key.clone()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_of(entities: &[ExtractedEntity]) -> Vec<(String, EntityType)> {
        entities
            .iter()
            .map(|e| (e.key.normalized.clone(), e.key.entity_type))
            .collect()
    }

    #[test]
    fn normalization_casefolds_and_collapses() {
        assert_eq!(normalize_surface("  FX   Forward! "), "fx forward");
        assert_eq!(normalize_surface("Non-Deliverable/Forward"), "non-deliverable/forward");
        assert_eq!(normalize_surface("A.B.C."), "a b c");
    }

    // === Scenario: alias variants collapse onto one entity ===

    #[test]
    fn product_aliases_map_to_canonical() {
        let extractor = EntityExtractor::new();
        for text in [
            "The FX Forward settles in two days.",
            "A Foreign Exchange Forward settles in two days.",
            "Each Currency Forward Contract settles in two days.",
        ] {
            let entities = extractor.extract(text);
            assert!(
                keys_of(&entities).contains(&("fx_forward".to_string(), EntityType::Product)),
                "no fx_forward in {text:?}: {:?}",
                keys_of(&entities)
            );
        }
    }

    #[test]
    fn longest_phrase_wins() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("An Interest Rate Swap hedges rate moves.");
        let keys = keys_of(&entities);
        assert!(keys.contains(&("interest_rate_swap".to_string(), EntityType::Product)));
        // The shorter "interest rate" term must not also fire inside it.
        assert!(!keys.contains(&("interest rate".to_string(), EntityType::Term)));
    }

    #[test]
    fn amounts_and_percents_extracted_at_095() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("A fee of $1,500.00 or 2.5% applies, plus 15 bps.");

        let amount = entities
            .iter()
            .find(|e| e.key.entity_type == EntityType::Amount)
            .expect("amount");
        assert_eq!(amount.confidence, CONFIDENCE_NUMERIC);

        let percents: Vec<_> = entities
            .iter()
            .filter(|e| e.key.entity_type == EntityType::Percent)
            .collect();
        assert_eq!(percents.len(), 2);
    }

    #[test]
    fn heuristic_ner_finds_orgs_and_persons() {
        let extractor = EntityExtractor::new();
        let entities =
            extractor.extract("Contact Mr Smith at Westpac Banking Corporation for details.");
        let keys = keys_of(&entities);
        assert!(keys.contains(&("smith".to_string(), EntityType::Person)));
        assert!(keys
            .iter()
            .any(|(n, t)| *t == EntityType::Org && n.contains("westpac")));
    }

    #[test]
    fn duplicate_mentions_collapse_to_max_confidence() {
        let extractor = EntityExtractor::new();
        let entities =
            extractor.extract("The premium is due. The premium covers the option premium.");
        let premiums: Vec<_> = entities
            .iter()
            .filter(|e| e.key.normalized == "premium")
            .collect();
        assert_eq!(premiums.len(), 1);
        assert_eq!(premiums[0].confidence, CONFIDENCE_PATTERN);
    }

    #[test]
    fn plural_and_singular_share_an_entity() {
        let extractor = EntityExtractor::new();
        let singular = extractor.extract("One term deposit matures monthly.");
        let plural = extractor.extract("Two term deposits mature monthly.");
        let key = ("term_deposit".to_string(), EntityType::Product);
        assert!(keys_of(&singular).contains(&key));
        assert!(keys_of(&plural).contains(&key));
    }

    #[test]
    fn no_entities_in_plain_prose() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("the quick brown fox jumps over the lazy dog");
        assert!(entities.is_empty());
    }
}
