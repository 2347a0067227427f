//! PDF document parser using pdf-extract
//!
//! Extracts text page by page so every window can be traced back to the
//! page it came from.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crate::{DocumentParser, PageText, ParsedDocument, ParserError, Result};

/// PDF headers may be preceded by junk; readers accept them within this range
const HEADER_SEARCH_LIMIT: usize = 1024;

/// PDF document parser
pub struct PdfParser {
    /// Fail when no page carries any text (e.g. scanned images)
    pub require_text: bool,
}

impl PdfParser {
    /// Create a new PDF parser with default settings
    pub fn new() -> Self {
        Self { require_text: true }
    }

    /// Accept documents without extractable text
    pub fn allow_empty(mut self) -> Self {
        self.require_text = false;
        self
    }

    /// Extract page texts from PDF bytes
    fn extract_pages(&self, name: &str, bytes: &[u8]) -> Result<Vec<String>> {
        if !has_pdf_header(bytes) {
            return Err(ParserError::CorruptedFile(format!(
                "{name}: missing %PDF header"
            )));
        }

        // pdf-extract panics on some malformed inputs instead of returning errors
        let extracted = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        }))
        .map_err(|panic| {
            let reason = panic
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| panic.downcast_ref::<&str>().copied())
                .unwrap_or("extractor panicked");
            ParserError::CorruptedFile(format!("{name}: {reason}"))
        })?;

        extracted.map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("encrypt") {
                ParserError::EncryptedFile(name.to_string())
            } else {
                ParserError::PdfError(format!("{name}: {message}"))
            }
        })
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());

        self.parse_bytes(&name, &bytes)
    }

    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let pages = self.extract_pages(name, bytes)?;

        let doc = ParsedDocument {
            name: name.to_string(),
            pages: pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| PageText {
                    number: i as u32 + 1,
                    text,
                })
                .collect(),
        };

        if self.require_text && doc.is_blank() {
            return Err(ParserError::NoExtractableText(name.to_string()));
        }

        tracing::debug!(
            document = name,
            pages = doc.page_count(),
            chars = doc.char_count(),
            "PDF text extracted"
        );

        Ok(doc)
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(HEADER_SEARCH_LIMIT)];
    head.windows(5).any(|w| w == b"%PDF-")
}
