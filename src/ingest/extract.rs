//! Page-structured PDF text extraction with OCR fallback.
//!
//! `PdfExtractor` is the seam between the engine and whatever parses
//! bytes into pages; production uses lopdf, tests use a static source.
//! When a parse succeeds but yields under `MIN_TEXT_CHARS` characters
//! across all pages (scanned documents, mostly), the OCR hook runs at
//! 300 DPI; if the result is still under the threshold the document is
//! empty. Extraction never retries internally.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};

/// Minimum total extracted characters before the OCR fallback engages.
pub const MIN_TEXT_CHARS: usize = 100;

/// Render resolution handed to OCR engines.
pub const OCR_DPI: u32 = 300;

/// One page of extracted text. `page_num` is 1-indexed and contiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub page_num: u32,
    pub text: String,
}

/// Parses a PDF byte stream into ordered pages.
pub trait PdfExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<Vec<Page>, IngestError>;
}

/// Renders pages to images and recognizes text; the 300 DPI fallback
/// path for scanned documents. The default build ships no engine.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, bytes: &[u8], dpi: u32) -> Result<Vec<Page>, IngestError>;
}

fn total_chars(pages: &[Page]) -> usize {
    pages.iter().map(|p| p.text.trim().len()).sum()
}

/// lopdf-backed extractor with an optional OCR fallback.
pub struct LopdfExtractor {
    ocr: Option<Box<dyn OcrEngine>>,
}

impl LopdfExtractor {
    pub fn new() -> Self {
        Self { ocr: None }
    }

    pub fn with_ocr(ocr: Box<dyn OcrEngine>) -> Self {
        Self { ocr: Some(ocr) }
    }

    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<Page>, IngestError> {
        let document = lopdf::Document::load_mem(bytes)
            .map_err(|e| IngestError::Unreadable(e.to_string()))?;

        let mut pages = Vec::new();
        let mut page_num = 0u32;
        for (source_page, _object_id) in document.get_pages() {
            page_num += 1;
            let text = document
                .extract_text(&[source_page])
                .unwrap_or_default();
            pages.push(Page { page_num, text });
        }
        Ok(pages)
    }
}

impl Default for LopdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<Vec<Page>, IngestError> {
        let pages = self.extract_pages(bytes)?;

        if total_chars(&pages) >= MIN_TEXT_CHARS {
            return Ok(pages);
        }

        tracing::info!(
            filename,
            chars = total_chars(&pages),
            "minimal text extracted, engaging OCR fallback"
        );

        if let Some(ocr) = &self.ocr {
            let ocr_pages = ocr.recognize(bytes, OCR_DPI)?;
            if total_chars(&ocr_pages) >= MIN_TEXT_CHARS {
                return Ok(ocr_pages);
            }
        }

        Err(IngestError::EmptyDocument(MIN_TEXT_CHARS))
    }
}

/// Extractor over pre-supplied pages, used by tests and by callers that
/// already hold extracted text (re-ingestion from an export, say). The
/// same <100-character contract applies.
pub struct StaticExtractor {
    pages: Vec<Page>,
}

impl StaticExtractor {
    pub fn new(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    /// One page per input string, numbered from 1.
    pub fn from_texts<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page {
                page_num: (i + 1) as u32,
                text: text.into(),
            })
            .collect();
        Self { pages }
    }
}

impl PdfExtractor for StaticExtractor {
    fn extract(&self, _bytes: &[u8], _filename: &str) -> Result<Vec<Page>, IngestError> {
        if total_chars(&self.pages) < MIN_TEXT_CHARS {
            return Err(IngestError::EmptyDocument(MIN_TEXT_CHARS));
        }
        Ok(self.pages.clone())
    }
}
