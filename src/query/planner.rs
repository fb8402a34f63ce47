//! Query classification and keyword extraction.
//!
//! Classification is exact and deterministic: the first matching
//! pattern class in a fixed order wins. The class only biases reranker
//! tie-breaks and selects class-specific keyword handling; it never
//! changes which retrievers run.

use crate::graph::ChunkType;
use crate::ingest::chunker::{is_stopword, tokenize};
use regex::Regex;

/// Pattern classes, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    Definition,
    Requirement,
    Fee,
    Process,
    Limit,
    General,
}

impl QueryClass {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryClass::Definition => "definition",
            QueryClass::Requirement => "requirement",
            QueryClass::Fee => "fee",
            QueryClass::Process => "process",
            QueryClass::Limit => "limit",
            QueryClass::General => "general",
        }
    }

    /// The chunk type this class prefers, for reranker type-match
    /// scoring. Fee and limit answers live in tables more often than
    /// not; process questions want worked examples.
    pub fn preferred_chunk_type(self) -> Option<ChunkType> {
        match self {
            QueryClass::Definition => Some(ChunkType::Definition),
            QueryClass::Process => Some(ChunkType::Example),
            QueryClass::Fee | QueryClass::Limit => Some(ChunkType::Table),
            QueryClass::Requirement | QueryClass::General => None,
        }
    }

    /// Keywords this class promotes into the extracted set.
    fn promoted_keywords(self) -> &'static [&'static str] {
        match self {
            QueryClass::Fee => &["fee", "charge", "cost"],
            QueryClass::Requirement => &["minimum", "eligibility"],
            QueryClass::Limit => &["limit", "maximum"],
            QueryClass::Process => &["process", "steps"],
            QueryClass::Definition | QueryClass::General => &[],
        }
    }
}

/// Generic stopwords dropped from every query on top of the corpus
/// list.
const QUERY_STOPWORDS: &[&str] = &[
    "what", "when", "where", "which", "who", "how", "why", "does", "did", "i", "me", "my", "we",
    "our", "us", "about", "am", "any", "would", "could", "should", "please", "tell", "show",
];

/// Banking-generic tokens dropped when they stand alone, kept when they
/// complete a noun phrase ("foreign currency account").
const DOMAIN_STOPWORDS: &[&str] = &["account", "bank", "banking", "product", "customer", "client"];

/// One compiled classifier + keyword extractor.
pub struct QueryPlanner {
    classes: Vec<(QueryClass, Regex)>,
}

impl QueryPlanner {
    pub fn new() -> Self {
        let classes = vec![
            (
                QueryClass::Definition,
                Regex::new(r"(?i)\b(what is|what are|define|definition|meaning of)\b").unwrap(),
            ),
            (
                QueryClass::Requirement,
                Regex::new(r"(?i)\b(requirement|require|must|need to|eligible|eligibility|qualify)\b")
                    .unwrap(),
            ),
            (
                QueryClass::Fee,
                Regex::new(r"(?i)\b(fee|fees|charge|charges|cost|costs|premium|pricing|commission)\b")
                    .unwrap(),
            ),
            (
                QueryClass::Process,
                Regex::new(r"(?i)\b(how to|how do|how can|steps|process|procedure)\b").unwrap(),
            ),
            (
                QueryClass::Limit,
                Regex::new(r"(?i)\b(limit|limits|maximum|minimum|cap|threshold|restriction)\b")
                    .unwrap(),
            ),
        ];
        Self { classes }
    }

    /// First matching class in fixed order; `General` otherwise.
    pub fn classify(&self, query: &str) -> QueryClass {
        for (class, pattern) in &self.classes {
            if pattern.is_match(query) {
                return *class;
            }
        }
        QueryClass::General
    }

    /// Extract search keywords: lowercase, stopwords removed, numbers
    /// kept verbatim, domain-generic tokens kept only inside noun
    /// phrases, class promotions appended.
    pub fn extract_keywords(&self, query: &str, class: QueryClass) -> Vec<String> {
        let tokens = tokenize(query);
        let mut keywords: Vec<String> = Vec::new();
        let mut previous_kept = false;

        for token in &tokens {
            let lower = token.to_lowercase();

            // Numbers pass through untouched.
            if lower.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                keywords.push(lower);
                previous_kept = true;
                continue;
            }
            if is_stopword(&lower) || QUERY_STOPWORDS.contains(&lower.as_str()) {
                previous_kept = false;
                continue;
            }
            if DOMAIN_STOPWORDS.contains(&lower.as_str()) && !previous_kept {
                continue;
            }
            keywords.push(lower);
            previous_kept = true;
        }

        for promoted in class.promoted_keywords() {
            keywords.push(promoted.to_string());
        }

        // Order-preserving dedup; repeated query words count once.
        let mut seen = std::collections::HashSet::new();
        keywords.retain(|k| seen.insert(k.clone()));
        keywords
    }
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_deterministic_first_match() {
        let planner = QueryPlanner::new();
        assert_eq!(planner.classify("What is an FX Forward?"), QueryClass::Definition);
        assert_eq!(
            planner.classify("minimum deposit to qualify"),
            QueryClass::Requirement
        );
        assert_eq!(planner.classify("monthly account fees"), QueryClass::Fee);
        assert_eq!(planner.classify("how do I settle early"), QueryClass::Process);
        assert_eq!(planner.classify("daily transfer cap"), QueryClass::Limit);
        assert_eq!(planner.classify("term deposits overview"), QueryClass::General);
        // Definition outranks fee when both match.
        assert_eq!(
            planner.classify("what is the establishment fee"),
            QueryClass::Definition
        );
    }

    #[test]
    fn keywords_drop_stopwords_and_keep_numbers() {
        let planner = QueryPlanner::new();
        let keywords =
            planner.extract_keywords("What is the premium on 100000 notional?", QueryClass::General);
        assert!(keywords.contains(&"premium".to_string()));
        assert!(keywords.contains(&"100000".to_string()));
        assert!(keywords.contains(&"notional".to_string()));
        assert!(!keywords.contains(&"what".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
    }

    #[test]
    fn standalone_domain_generic_dropped_but_phrase_kept() {
        let planner = QueryPlanner::new();

        // "account" alone adds nothing.
        let alone = planner.extract_keywords("tell me about my account", QueryClass::General);
        assert!(!alone.contains(&"account".to_string()));

        // Inside "foreign currency account" it completes the phrase.
        let phrase =
            planner.extract_keywords("foreign currency account rates", QueryClass::General);
        assert!(phrase.contains(&"account".to_string()));
        assert!(phrase.contains(&"currency".to_string()));
    }

    #[test]
    fn fee_class_promotes_fee_vocabulary() {
        let planner = QueryPlanner::new();
        let class = planner.classify("what does it cost monthly");
        assert_eq!(class, QueryClass::Fee);
        let keywords = planner.extract_keywords("what does it cost monthly", class);
        assert!(keywords.contains(&"fee".to_string()));
        assert!(keywords.contains(&"charge".to_string()));
        assert!(keywords.contains(&"cost".to_string()));
    }

    #[test]
    fn preferred_chunk_types() {
        assert_eq!(
            QueryClass::Definition.preferred_chunk_type(),
            Some(ChunkType::Definition)
        );
        assert_eq!(QueryClass::Fee.preferred_chunk_type(), Some(ChunkType::Table));
        assert_eq!(QueryClass::General.preferred_chunk_type(), None);
    }
}
