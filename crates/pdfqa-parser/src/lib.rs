//! PDFQA Parser - PDF text extraction and window splitting
//!
//! A PDF is parsed into per-page text (`ParsedDocument`), which is then
//! split into overlapping fixed-size windows (`TextChunk`) ready for
//! embedding. Each window remembers the page it starts on.

use std::ops::Range;
use std::path::Path;
use thiserror::Error;

pub mod pdf;

pub use pdf::PdfParser;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during document parsing
#[derive(Error, Debug)]
pub enum ParserError {
    /// IO error while reading the file
    #[error("IO error reading file: {path}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// PDF parsing error reported by the extraction library
    #[error("PDF parsing error: {0}")]
    PdfError(String),

    /// File is encrypted and cannot be parsed
    #[error("File is encrypted and requires a password: {0}")]
    EncryptedFile(String),

    /// File is corrupted or malformed
    #[error("File is corrupted or malformed: {0}")]
    CorruptedFile(String),

    /// The document parsed but contains no text
    #[error("No extractable text in {0}")]
    NoExtractableText(String),

    /// Splitter settings are unusable
    #[error("Invalid chunk configuration: {0}")]
    InvalidChunkConfig(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Parsed Document Types
// ============================================================================

/// Separator placed between pages when the document text is concatenated
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Text of a single page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// Page number (1-based)
    pub number: u32,

    /// Extracted text
    pub text: String,
}

/// A parsed document with per-page text
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// File name or path the document came from
    pub name: String,

    /// Pages in order
    pub pages: Vec<PageText>,
}

impl ParsedDocument {
    /// Create a document from page texts, numbering pages from 1
    pub fn from_pages<I, S>(name: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageText {
                number: i as u32 + 1,
                text: text.into(),
            })
            .collect();

        Self {
            name: name.into(),
            pages,
        }
    }

    /// Number of pages
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Concatenated text of all pages
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }

    /// Character offsets where each page starts in `full_text`
    pub fn page_offsets(&self) -> Vec<usize> {
        let separator_len = PAGE_SEPARATOR.chars().count();
        let mut offsets = Vec::with_capacity(self.pages.len());
        let mut offset = 0;

        for (i, page) in self.pages.iter().enumerate() {
            if i > 0 {
                offset += separator_len;
            }
            offsets.push(offset);
            offset += page.text.chars().count();
        }

        offsets
    }

    /// Length of `full_text` in characters, page separators included
    ///
    /// Window offsets index into the same text, so the last window of a
    /// document always ends at `char_count`.
    pub fn char_count(&self) -> usize {
        let separators = self.pages.len().saturating_sub(1) * PAGE_SEPARATOR.chars().count();
        self.pages
            .iter()
            .map(|p| p.text.chars().count())
            .sum::<usize>()
            + separators
    }

    /// True when no page carries any non-whitespace text
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

// ============================================================================
// Parser Trait
// ============================================================================

/// Trait for document parsers
pub trait DocumentParser: Send + Sync {
    /// Parse a document from a file path
    fn parse(&self, path: &Path) -> Result<ParsedDocument>;

    /// Parse a document already held in memory
    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument>;
}

// ============================================================================
// Chunking
// ============================================================================

/// Configuration for document chunking
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum window size in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive windows
    pub overlap: usize,

    /// End windows on paragraph/sentence/word boundaries when one is near
    pub respect_boundaries: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
            respect_boundaries: true,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            ..Default::default()
        }
    }
}

/// A window of text from a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Chunk content
    pub content: String,

    /// Chunk index within the document
    pub index: u32,

    /// Starting character offset in the concatenated text
    pub start_offset: usize,

    /// Ending character offset (exclusive)
    pub end_offset: usize,

    /// Page the window starts on (1-based)
    pub page: u32,
}

/// Splits text into overlapping windows
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkConfig,
}

impl TextSplitter {
    /// Create a splitter, rejecting sizes that could not make progress
    pub fn new(config: ChunkConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(ParserError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if config.overlap >= config.chunk_size {
            return Err(ParserError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                config.overlap, config.chunk_size
            )));
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Split a parsed document into windows tagged with their start page.
    /// Whitespace-only windows are dropped.
    pub fn split_document(&self, doc: &ParsedDocument) -> Vec<TextChunk> {
        let text = doc.full_text();
        let chars: Vec<char> = text.chars().collect();
        let page_offsets = doc.page_offsets();

        let mut chunks = Vec::new();
        for range in self.split_chars(&chars) {
            let content: String = chars[range.clone()].iter().collect();
            if content.trim().is_empty() {
                continue;
            }

            chunks.push(TextChunk {
                content,
                index: chunks.len() as u32,
                start_offset: range.start,
                end_offset: range.end,
                page: page_for_offset(&page_offsets, range.start),
            });
        }

        tracing::debug!(
            pages = doc.page_count(),
            chars = chars.len(),
            chunks = chunks.len(),
            "Document split into windows"
        );

        chunks
    }

    /// Character ranges of the windows covering `text`
    ///
    /// Every range is at most `chunk_size` long, each range starts exactly
    /// `overlap` characters before the previous one ended, and the last
    /// range ends at the end of the text.
    pub fn split_ranges(&self, text: &str) -> Vec<Range<usize>> {
        let chars: Vec<char> = text.chars().collect();
        self.split_chars(&chars)
    }

    fn split_chars(&self, chars: &[char]) -> Vec<Range<usize>> {
        let len = chars.len();
        let size = self.config.chunk_size;
        let overlap = self.config.overlap;
        let mut ranges = Vec::new();

        if len == 0 {
            return ranges;
        }

        let mut start = 0;
        loop {
            let hard_end = (start + size).min(len);
            let end = if hard_end < len && self.config.respect_boundaries {
                // The next window starts at end - overlap, which must be past start
                find_break_point(chars, start + overlap + 1, hard_end, size)
            } else {
                hard_end
            };

            ranges.push(start..end);

            if end >= len {
                break;
            }
            start = end - overlap;
        }

        ranges
    }
}

/// Page containing the given character offset
fn page_for_offset(page_offsets: &[usize], offset: usize) -> u32 {
    let pages_started = page_offsets.partition_point(|&start| start <= offset);
    pages_started.max(1) as u32
}

/// Find a good break point at or before `target`, never below `floor`
fn find_break_point(chars: &[char], floor: usize, target: usize, chunk_size: usize) -> usize {
    let lookback = (chunk_size / 10).max(1);
    let search_floor = floor.max(target.saturating_sub(lookback)).max(2);

    if search_floor > target {
        return target;
    }

    let ends_after =
        |pred: &dyn Fn(usize) -> bool| (search_floor..=target).rev().find(|&e| pred(e));

    // Paragraph break
    if let Some(end) = ends_after(&|e: usize| chars[e - 1] == '\n' && chars[e - 2] == '\n') {
        return end;
    }

    // Line break
    if let Some(end) = ends_after(&|e: usize| chars[e - 1] == '\n') {
        return end;
    }

    // Sentence end
    if let Some(end) = ends_after(&|e: usize| {
        chars[e - 1] == '。' || (chars[e - 1] == ' ' && matches!(chars[e - 2], '.' | '!' | '?'))
    }) {
        return end;
    }

    // Word boundary
    if let Some(end) = ends_after(&|e: usize| chars[e - 1].is_whitespace()) {
        return end;
    }

    target
}

// ============================================================================
// Tests
// ============================================================================
