//! Semantic-boundary-aware chunking.
//!
//! The tokenizer is fixed and defines token counts everywhere in the
//! engine: text splits on Unicode whitespace, then each piece is
//! stripped of leading and trailing characters that are not
//! alphanumeric, `$`, or `%`; interior punctuation (hyphens, slashes,
//! decimal points) survives. Empty residues are not tokens.
//!
//! Chunks target `chunk_target_tokens` with `chunk_overlap_tokens` of
//! overlap. A window whose proposed split lands mid-sentence (no
//! sentence-terminal token in the trailing lookback) extends forward to
//! the next terminator, up to the hard maximum. Table blocks are
//! detected per page and always emitted as single `table` chunks, even
//! oversized ones. Concatenating chunk texts with overlap removed
//! reconstructs the page text up to whitespace normalization.

use super::extract::Page;
use crate::config::Config;
use crate::graph::ChunkType;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Tokens of trailing lookback when deciding whether a split lands
/// inside a sentence.
const SENTENCE_LOOKBACK: usize = 30;

/// Consecutive structured lines required to call a region a table.
const TABLE_MIN_LINES: usize = 3;

/// Stopwords excluded from semantic density numerators and keyword
/// lists. Deliberately small; this is not the query-side list.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "do", "for", "from",
    "has", "have", "if", "in", "into", "is", "it", "its", "may", "not", "of", "on", "or", "such",
    "that", "the", "their", "then", "there", "these", "this", "to", "was", "were", "will", "with",
    "you", "your",
];

/// Tokenize per the fixed tokenizer described in the module docs.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|raw| {
            let token = raw
                .trim_start_matches(|c: char| !c.is_alphanumeric() && c != '$' && c != '%')
                .trim_end_matches(|c: char| !c.is_alphanumeric() && c != '$' && c != '%');
            if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            }
        })
        .collect()
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token.to_lowercase().as_str())
}

/// A chunk before it gets a graph identity: page-scoped text plus the
/// token span it covers within its segment (for reconstruction checks).
#[derive(Debug, Clone)]
pub struct DraftChunk {
    pub text: String,
    pub page_num: u32,
    pub token_count: u32,
    pub chunk_type: ChunkType,
    pub has_definitions: bool,
    pub has_examples: bool,
    pub semantic_density: f32,
    pub keywords: Vec<String>,
    /// Token offset of this chunk within its text segment; tables span
    /// their whole block.
    pub token_start: usize,
    pub token_end: usize,
}

/// Boundary-aware chunker. Construct once per pipeline; regexes are
/// compiled up front.
pub struct Chunker {
    target: usize,
    overlap: usize,
    max: usize,
    definition_re: Regex,
    term_colon_re: Regex,
    example_re: Regex,
}

impl Chunker {
    pub fn new(config: &Config) -> Self {
        Self {
            target: config.chunk_target_tokens.max(1),
            overlap: config.chunk_overlap_tokens,
            max: config.chunk_max_tokens.max(config.chunk_target_tokens),
            definition_re: Regex::new(r"(?i)\bis (defined as|a|an)\b").unwrap(),
            term_colon_re: Regex::new(r"(?m)^\s*[A-Z][A-Za-z /\-]{0,40}:\s+\S").unwrap(),
            example_re: Regex::new(r"(?i)\b(for example|e\.g\.|such as)\b").unwrap(),
        }
    }

    /// Chunk all pages of a document, in page order.
    pub fn chunk_pages(&self, pages: &[Page]) -> Vec<DraftChunk> {
        let mut out = Vec::new();
        for page in pages {
            self.chunk_page(page, &mut out);
        }
        out
    }

    fn chunk_page(&self, page: &Page, out: &mut Vec<DraftChunk>) {
        for segment in split_table_segments(&page.text) {
            match segment {
                Segment::Table(block) => {
                    let tokens = tokenize(&block);
                    if tokens.is_empty() {
                        continue;
                    }
                    out.push(self.finish_chunk(&block, page.page_num, 0, tokens.len(), true));
                }
                Segment::Text(text) => {
                    self.chunk_text_segment(&text, page.page_num, out);
                }
            }
        }
    }

    fn chunk_text_segment(&self, text: &str, page_num: u32, out: &mut Vec<DraftChunk>) {
        let words: Vec<&str> = text.split_whitespace().collect();
        if tokenize(text).is_empty() {
            return;
        }

        let mut start = 0usize;
        while start < words.len() {
            let mut end = (start + self.target).min(words.len());

            // Extend past a mid-sentence boundary, up to the hard max.
            if end < words.len() && !self.has_terminator(&words, end) {
                let limit = (start + self.max).min(words.len());
                while end < limit && !ends_sentence(words[end - 1]) {
                    end += 1;
                }
            }

            let chunk_text = words[start..end].join(" ");
            out.push(self.finish_chunk(&chunk_text, page_num, start, end, false));

            if end >= words.len() {
                break;
            }
            let next = end.saturating_sub(self.overlap);
            // Overlap must never stall the walk.
            start = if next > start { next } else { end };
        }
    }

    /// Whether any of the last `SENTENCE_LOOKBACK` words before `end`
    /// terminates a sentence.
    fn has_terminator(&self, words: &[&str], end: usize) -> bool {
        let from = end.saturating_sub(SENTENCE_LOOKBACK);
        words[from..end].iter().any(|w| ends_sentence(w))
    }

    fn finish_chunk(
        &self,
        text: &str,
        page_num: u32,
        token_start: usize,
        token_end: usize,
        table: bool,
    ) -> DraftChunk {
        let tokens = tokenize(text);
        let has_definitions =
            self.definition_re.is_match(text) || self.term_colon_re.is_match(text);
        let has_examples = self.example_re.is_match(text);

        // Priority: table > definition > example > content.
        let chunk_type = if table {
            ChunkType::Table
        } else if has_definitions {
            ChunkType::Definition
        } else if has_examples {
            ChunkType::Example
        } else {
            ChunkType::Content
        };

        DraftChunk {
            text: text.to_string(),
            page_num,
            token_count: tokens.len() as u32,
            chunk_type,
            has_definitions,
            has_examples,
            semantic_density: semantic_density(&tokens),
            keywords: top_keywords(&tokens, 10),
            token_start,
            token_end,
        }
    }
}

fn ends_sentence(word: &str) -> bool {
    matches!(word.chars().last(), Some('.') | Some('!') | Some('?'))
}

/// Unique-content-token ratio: distinct lowercased non-stopword tokens
/// over total tokens, in [0, 1].
fn semantic_density(tokens: &[String]) -> f32 {
    if tokens.is_empty() {
        return 0.0;
    }
    let unique: HashSet<String> = tokens
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect();
    (unique.len() as f32 / tokens.len() as f32).clamp(0.0, 1.0)
}

/// Most frequent non-stopword tokens longer than three characters.
fn top_keywords(tokens: &[String], n: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokens {
        let lower = token.to_lowercase();
        if lower.len() > 3 && !STOPWORDS.contains(&lower.as_str()) {
            *counts.entry(lower).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(n).map(|(k, _)| k).collect()
}

enum Segment {
    Text(String),
    Table(String),
}

/// Whether a line looks like a table row: at least two pipes, or at
/// least three columns separated by runs of two-plus spaces.
fn is_table_line(line: &str) -> bool {
    if line.matches('|').count() >= 2 {
        return true;
    }
    let columns = line
        .split("  ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .count();
    columns >= 3
}

/// Split page text into alternating prose and table segments. A table
/// needs at least `TABLE_MIN_LINES` consecutive structured lines;
/// shorter runs stay prose.
fn split_table_segments(text: &str) -> Vec<Segment> {
    let lines: Vec<&str> = text.lines().collect();
    let mut segments = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if is_table_line(lines[i]) {
            let mut j = i;
            while j < lines.len() && is_table_line(lines[j]) {
                j += 1;
            }
            if j - i >= TABLE_MIN_LINES {
                if !prose.is_empty() {
                    segments.push(Segment::Text(prose.join("\n")));
                    prose.clear();
                }
                segments.push(Segment::Table(lines[i..j].join("\n")));
                i = j;
                continue;
            }
            // Too short to be a table; treat as prose.
            prose.extend(&lines[i..j]);
            i = j;
        } else {
            prose.push(lines[i]);
            i += 1;
        }
    }
    if !prose.is_empty() {
        segments.push(Segment::Text(prose.join("\n")));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(target: usize, overlap: usize, max: usize) -> Config {
        let mut c = Config::default();
        c.chunk_target_tokens = target;
        c.chunk_overlap_tokens = overlap;
        c.chunk_max_tokens = max;
        c
    }

    fn page(text: &str) -> Page {
        Page { page_num: 1, text: text.to_string() }
    }

    #[test]
    fn tokenizer_strips_edge_punctuation() {
        assert_eq!(tokenize("Hello, world!"), vec!["Hello", "world"]);
        assert_eq!(tokenize("(rate)"), vec!["rate"]);
        assert_eq!(tokenize("$1,000.50 5.5%"), vec!["$1,000.50", "5.5%"]);
        assert_eq!(tokenize("FX/Forward non-deliverable"), vec!["FX/Forward", "non-deliverable"]);
        assert_eq!(tokenize("-- ... !!"), Vec::<String>::new());
    }

    #[test]
    fn short_page_is_one_chunk() {
        let chunker = Chunker::new(&config(512, 128, 1024));
        let chunks = chunker.chunk_pages(&[page("One short sentence about deposits.")]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_num, 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Content);
    }

    #[test]
    fn long_text_splits_with_overlap() {
        // 40 sentences of 5 tokens each = 200 tokens; target 50, overlap 10.
        let text = (0..40)
            .map(|i| format!("Sentence number {i} is here."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunker = Chunker::new(&config(50, 10, 100));
        let chunks = chunker.chunk_pages(&[page(&text)]);

        assert!(chunks.len() > 1);
        // Every boundary overlaps by exactly the configured amount.
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].token_end - pair[1].token_start, 10);
        }
    }

    #[test]
    fn reconstruction_with_overlap_removed_matches_page() {
        let text = (0..30)
            .map(|i| format!("Clause {i} applies to the product."))
            .collect::<Vec<_>>()
            .join(" ");
        let chunker = Chunker::new(&config(40, 8, 80));
        let chunks = chunker.chunk_pages(&[page(&text)]);

        let mut rebuilt: Vec<String> = Vec::new();
        let mut covered = 0usize;
        for chunk in &chunks {
            let words: Vec<&str> = chunk.text.split_whitespace().collect();
            let skip = covered.saturating_sub(chunk.token_start);
            rebuilt.extend(words[skip..].iter().map(|w| w.to_string()));
            covered = chunk.token_end;
        }
        let normalized: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rebuilt, normalized);
    }

    #[test]
    fn split_extends_to_sentence_boundary() {
        // The only terminator near the split is at index 44: a target of
        // 40 extends forward to end the chunk there.
        let mut words: Vec<String> = (0..44).map(|i| format!("w{i}")).collect();
        words.push("end.".to_string());
        words.extend((0..14).map(|i| format!("t{i}")));
        words.push("done.".to_string());
        let text = words.join(" ");

        let chunker = Chunker::new(&config(40, 5, 100));
        let chunks = chunker.chunk_pages(&[page(&text)]);
        // First chunk must end on the terminator at index 45, not at 40.
        assert_eq!(chunks[0].token_end, 45);
        assert!(chunks[0].text.ends_with("end."));
    }

    #[test]
    fn hard_max_caps_extension() {
        // No terminator anywhere: the chunk stops at the hard max.
        let text = (0..300).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunker = Chunker::new(&config(50, 10, 80));
        let chunks = chunker.chunk_pages(&[page(&text)]);
        assert_eq!(chunks[0].token_end - chunks[0].token_start, 80);
    }

    // === Scenario: a table is never split ===

    #[test]
    fn pipe_table_is_one_table_chunk() {
        let text = "Intro paragraph about fees.\n\
                    | Product | Fee | Cap |\n\
                    | FX Forward | 1.5% | $500 |\n\
                    | FX Option | 2.0% | $750 |\n\
                    | Swap | 0.5% | $250 |\n\
                    Closing remarks follow the table here.";
        let chunker = Chunker::new(&config(5, 2, 10));
        let chunks = chunker.chunk_pages(&[page(text)]);

        let tables: Vec<_> = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkType::Table)
            .collect();
        assert_eq!(tables.len(), 1);
        // Oversized relative to the tiny target, still one chunk.
        assert!(tables[0].token_count > 10);
        assert!(tables[0].text.contains("FX Forward"));
        assert!(tables[0].text.contains("Swap"));
    }

    #[test]
    fn aligned_columns_count_as_table() {
        let text = "Tenor      Rate      Margin\n\
                    1M         4.10      0.20\n\
                    3M         4.25      0.20\n\
                    6M         4.40      0.25";
        let chunker = Chunker::new(&config(512, 128, 1024));
        let chunks = chunker.chunk_pages(&[page(text)]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Table);
    }

    #[test]
    fn two_structured_lines_stay_prose() {
        let text = "| a | b |\n| c | d |\nplain text continues here now.";
        let chunker = Chunker::new(&config(512, 128, 1024));
        let chunks = chunker.chunk_pages(&[page(text)]);
        assert!(chunks.iter().all(|c| c.chunk_type != ChunkType::Table));
    }

    #[test]
    fn definition_detection_and_priority() {
        let chunker = Chunker::new(&config(512, 128, 1024));

        let chunks = chunker.chunk_pages(&[page(
            "An FX Forward is a contract to exchange currencies at a preset rate.",
        )]);
        assert!(chunks[0].has_definitions);
        assert_eq!(chunks[0].chunk_type, ChunkType::Definition);

        // Term-colon style also counts.
        let chunks = chunker.chunk_pages(&[page("Strike Price: the rate fixed at inception.")]);
        assert!(chunks[0].has_definitions);
    }

    #[test]
    fn example_detection() {
        let chunker = Chunker::new(&config(512, 128, 1024));
        let chunks = chunker.chunk_pages(&[page(
            "Hedging tools vary, for example forwards and options both apply.",
        )]);
        assert!(chunks[0].has_examples);
        assert_eq!(chunks[0].chunk_type, ChunkType::Example);
    }

    #[test]
    fn definition_wins_over_example() {
        let chunker = Chunker::new(&config(512, 128, 1024));
        let chunks = chunker.chunk_pages(&[page(
            "A collar is a structure, for example combining a cap and a floor.",
        )]);
        assert!(chunks[0].has_definitions && chunks[0].has_examples);
        assert_eq!(chunks[0].chunk_type, ChunkType::Definition);
    }

    #[test]
    fn density_in_unit_range_and_repetition_lowers_it() {
        let chunker = Chunker::new(&config(512, 128, 1024));
        let varied = chunker.chunk_pages(&[page("Distinct tokens everywhere produce high density.")]);
        let repeated = chunker.chunk_pages(&[page("same same same same same same same same.")]);
        assert!(varied[0].semantic_density <= 1.0);
        assert!(repeated[0].semantic_density < varied[0].semantic_density);
    }

    #[test]
    fn keywords_skip_stopwords_and_short_tokens(){
        let chunker = Chunker::new(&config(512, 128, 1024));
        let chunks = chunker.chunk_pages(&[page(
            "The premium and the premium with a fee on settlement settlement settlement.",
        )]);
        assert!(chunks[0].keywords.contains(&"settlement".to_string()));
        assert!(chunks[0].keywords.contains(&"premium".to_string()));
        assert!(!chunks[0].keywords.contains(&"the".to_string()));
        assert!(!chunks[0].keywords.contains(&"fee".to_string())); // len 3
    }

    #[test]
    fn every_page_with_text_yields_a_chunk() {
        let chunker = Chunker::new(&config(512, 128, 1024));
        let pages: Vec<Page> = (1..=5)
            .map(|n| Page {
                page_num: n,
                text: format!("Page {n} content sentence."),
            })
            .collect();
        let chunks = chunker.chunk_pages(&pages);
        let covered: HashSet<u32> = chunks.iter().map(|c| c.page_num).collect();
        assert_eq!(covered.len(), 5);
    }
}
