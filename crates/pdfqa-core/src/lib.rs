//! PDFQA Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout PDF Q&A:
//! - Document chunks and retrieval results
//! - Question/answer records and the active-document description
//! - Common error types
//! - The completion service trait
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, DistanceMetric, DocumentConfig, LlmConfig, LlmProvider,
    LoggingConfig, RagConfig, ServerConfig,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for PDF Q&A operations
///
/// Indexing failures (`Parse`, `Embedding`, `Index`) and query failures
/// (`Llm`) are kept apart so callers can surface them as distinct states.
#[derive(Error, Debug)]
pub enum PdfQaError {
    #[error("Document parsing failed: {0}")]
    Parse(String),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Completion service error: {0}")]
    Llm(String),

    #[error("No document has been loaded")]
    NoDocumentLoaded,

    #[error("A document is currently being indexed")]
    IndexingInProgress,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PdfQaError {
    /// True for failures raised while building an index
    pub fn is_indexing_failure(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Embedding(_) | Self::Index(_))
    }

    /// True for failures raised while answering a question
    pub fn is_query_failure(&self) -> bool {
        matches!(self, Self::Llm(_))
    }
}

impl From<ConfigError> for PdfQaError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PdfQaError>;

// ============================================================================
// Document Models
// ============================================================================

/// A window of document text, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Position of the window within the document
    pub index: u32,

    /// Text content
    pub content: String,

    /// Page the window starts on (1-based)
    pub page: u32,

    /// Starting character offset in the concatenated document text
    pub start_offset: usize,

    /// Ending character offset (exclusive)
    pub end_offset: usize,
}

impl DocumentChunk {
    /// Create a new chunk
    pub fn new(index: u32, content: impl Into<String>, page: u32) -> Self {
        let content = content.into();
        let end_offset = content.chars().count();
        Self {
            index,
            content,
            page,
            start_offset: 0,
            end_offset,
        }
    }

    /// Set character offsets
    pub fn with_offsets(mut self, start: usize, end: usize) -> Self {
        self.start_offset = start;
        self.end_offset = end;
        self
    }
}

/// Description of the document currently backing a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Unique identifier
    pub id: Uuid,

    /// File name shown to the user
    pub name: String,

    /// Number of pages extracted
    pub page_count: u32,

    /// Number of windows stored in the index
    pub chunk_count: usize,

    /// Characters of concatenated page text, page separators included
    pub char_count: usize,

    /// When indexing finished
    pub indexed_at: DateTime<Utc>,
}

impl DocumentInfo {
    /// Create document info stamped with the current time
    pub fn new(
        name: impl Into<String>,
        page_count: u32,
        chunk_count: usize,
        char_count: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            page_count,
            chunk_count,
            char_count,
            indexed_at: Utc::now(),
        }
    }
}

// ============================================================================
// Retrieval and QA Types
// ============================================================================

/// A chunk returned by nearest-neighbor retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The matching window
    pub chunk: DocumentChunk,

    /// 1-based similarity rank
    pub rank: usize,

    /// Similarity score (higher is better)
    pub score: f32,
}

/// One question/answer exchange in a session's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl QaRecord {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        }
    }
}

/// Answer to a question together with its supporting evidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaAnswer {
    /// The question as asked
    pub question: String,

    /// Generated answer
    pub answer: String,

    /// Retrieved windows the answer was conditioned on
    pub sources: Vec<RetrievedChunk>,

    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for LLM completion clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model name for logging
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_builder() {
        let chunk = DocumentChunk::new(2, "hello world", 3).with_offsets(900, 911);

        assert_eq!(chunk.index, 2);
        assert_eq!(chunk.page, 3);
        assert_eq!((chunk.start_offset, chunk.end_offset), (900, 911));
    }

    #[test]
    fn test_chunk_new_counts_chars_not_bytes() {
        let chunk = DocumentChunk::new(0, "계약 기간", 1);
        assert_eq!(chunk.end_offset, 5);
    }

    #[test]
    fn test_error_classes() {
        assert!(PdfQaError::Parse("bad xref".into()).is_indexing_failure());
        assert!(PdfQaError::Embedding("quota".into()).is_indexing_failure());
        assert!(PdfQaError::Llm("timeout".into()).is_query_failure());
        assert!(!PdfQaError::NoDocumentLoaded.is_query_failure());
        assert!(!PdfQaError::NoDocumentLoaded.is_indexing_failure());
    }

    #[test]
    fn test_qa_record_serialization() {
        let record = QaRecord::new("What is the contract term?", "Two years.");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["question"], "What is the contract term?");
        assert_eq!(json["answer"], "Two years.");
        assert!(json["asked_at"].is_string());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: PdfQaError = ConfigError::MissingRequired("OPENAI_API_KEY".into()).into();
        assert!(matches!(err, PdfQaError::Config(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
