//! Document indexing
//!
//! Turns a PDF into a searchable [`DocumentIndex`]: extract page text,
//! split it into overlapping windows, embed every window and load the
//! vectors into an in-memory nearest-neighbor index.
//!
//! Author: hephaex@gmail.com

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use pdfqa_core::{
    AppConfig, DistanceMetric, DocumentChunk, DocumentInfo, PdfQaError, RagConfig, Result,
    RetrievedChunk,
};
use pdfqa_parser::{ChunkConfig, DocumentParser, ParsedDocument, ParserError, TextSplitter};
use pdfqa_vector::{EmbeddingClient, VectorIndex};

// ============================================================================
// Sources
// ============================================================================

/// Where a document comes from
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// A file on the local disk
    Path(PathBuf),
    /// Uploaded bytes with the client-supplied file name
    Bytes { name: String, bytes: Vec<u8> },
}

impl DocumentSource {
    /// Display name used in logs and document info
    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes { name, .. } => name.clone(),
        }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

fn parser_error(e: ParserError) -> PdfQaError {
    match e {
        ParserError::InvalidChunkConfig(msg) => PdfQaError::Config(msg),
        other => PdfQaError::Parse(other.to_string()),
    }
}

// ============================================================================
// Document Index
// ============================================================================

/// A loaded document that can answer nearest-neighbor queries
///
/// Owns everything needed to go from a question string to the top-k
/// windows: the vectors, the windows and the embedding client that
/// produced them.
pub struct DocumentIndex {
    info: DocumentInfo,
    vectors: VectorIndex,
    embedder: Arc<dyn EmbeddingClient>,
    top_k: usize,
    min_score: Option<f32>,
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("info", &self.info)
            .field("windows", &self.vectors.len())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl DocumentIndex {
    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    /// Stored windows in document order
    pub fn chunks(&self) -> &[DocumentChunk] {
        self.vectors.chunks()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Embed `question` and return the closest windows, best first
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        let query = self.embedder.embed(question).await?;
        let mut results = self.vectors.search(&query, self.top_k)?;

        if let Some(min_score) = self.min_score {
            results.retain(|r| r.score >= min_score);
        }

        tracing::debug!(
            document = %self.info.name,
            retrieved = results.len(),
            top_k = self.top_k,
            "Windows retrieved"
        );

        Ok(results)
    }
}

// ============================================================================
// Indexer
// ============================================================================

/// Builds document indexes
pub struct DocumentIndexer {
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<dyn EmbeddingClient>,
    splitter: TextSplitter,
    metric: DistanceMetric,
    top_k: usize,
    min_score: Option<f32>,
    batch_size: usize,
}

impl DocumentIndexer {
    /// Create an indexer; fails on an invalid window configuration
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn EmbeddingClient>,
        rag: &RagConfig,
        batch_size: usize,
    ) -> Result<Self> {
        let splitter = TextSplitter::new(ChunkConfig::new(rag.chunk_size, rag.chunk_overlap))
            .map_err(parser_error)?;

        Ok(Self {
            parser,
            embedder,
            splitter,
            metric: rag.metric,
            top_k: rag.top_k,
            min_score: rag.min_score,
            batch_size: batch_size.max(1),
        })
    }

    /// Create an indexer from application config
    pub fn from_config(
        config: &AppConfig,
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self> {
        Self::new(parser, embedder, &config.rag, config.llm.embedding_batch_size)
    }

    /// Extract page text without blocking the async runtime
    pub async fn parse(&self, source: DocumentSource) -> Result<ParsedDocument> {
        let parser = Arc::clone(&self.parser);
        let name = source.name();

        let parsed = tokio::task::spawn_blocking(move || match source {
            DocumentSource::Path(path) => parser.parse(&path),
            DocumentSource::Bytes { name, bytes } => parser.parse_bytes(&name, &bytes),
        })
        .await
        .map_err(|e| PdfQaError::Parse(format!("{name}: extraction task failed: {e}")))?;

        parsed.map_err(parser_error)
    }

    /// Parse, split, embed and index a document
    pub async fn index(&self, source: DocumentSource) -> Result<DocumentIndex> {
        let doc = self.parse(source).await?;
        self.index_parsed(doc).await
    }

    /// Split, embed and index already extracted text
    pub async fn index_parsed(&self, doc: ParsedDocument) -> Result<DocumentIndex> {
        let start = Instant::now();

        if doc.is_blank() {
            return Err(PdfQaError::Parse(format!(
                "No extractable text in {}",
                doc.name
            )));
        }

        let chunks: Vec<DocumentChunk> = self
            .splitter
            .split_document(&doc)
            .into_iter()
            .map(|c| {
                DocumentChunk::new(c.index, c.content, c.page)
                    .with_offsets(c.start_offset, c.end_offset)
            })
            .collect();

        let embeddings = self.embed_chunks(&chunks).await?;
        let chunk_count = chunks.len();
        let vectors = VectorIndex::build(chunks, embeddings, self.metric)?;

        let info = DocumentInfo::new(
            doc.name.clone(),
            doc.page_count(),
            chunk_count,
            doc.char_count(),
        );

        tracing::info!(
            document = %info.name,
            pages = info.page_count,
            chunks = info.chunk_count,
            dimension = vectors.dimension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Document indexed"
        );

        Ok(DocumentIndex {
            info,
            vectors,
            embedder: Arc::clone(&self.embedder),
            top_k: self.top_k,
            min_score: self.min_score,
        })
    }

    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            let vectors = self.embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(PdfQaError::Embedding(format!(
                    "batch {batch_no}: expected {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            tracing::debug!(batch = batch_no, size = batch.len(), "Embedded batch");
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEmbedding, FakeParser};

    fn indexer(embedder: Arc<FakeEmbedding>, rag: &RagConfig) -> DocumentIndexer {
        DocumentIndexer::new(Arc::new(FakeParser), embedder, rag, 512).unwrap()
    }

    fn three_page_doc() -> ParsedDocument {
        // 832 + 2 + 832 + 2 + 832 = 2500 characters
        ParsedDocument::from_pages(
            "contract.pdf",
            ["a".repeat(832), "b".repeat(832), "c".repeat(832)],
        )
    }

    #[tokio::test]
    async fn test_three_pages_give_three_windows() {
        let embedder = Arc::new(FakeEmbedding::default());
        let index = indexer(embedder, &RagConfig::default())
            .index_parsed(three_page_doc())
            .await
            .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.info().page_count, 3);
        assert_eq!(index.info().chunk_count, 3);
        assert_eq!(index.info().char_count, 2500);

        let pages: Vec<u32> = index.chunks().iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);

        let spans: Vec<(usize, usize)> = index
            .chunks()
            .iter()
            .map(|c| (c.start_offset, c.end_offset))
            .collect();
        assert_eq!(spans, vec![(0, 1000), (900, 1900), (1800, 2500)]);
    }

    #[tokio::test]
    async fn test_blank_document_is_rejected() {
        let embedder = Arc::new(FakeEmbedding::default());
        let doc = ParsedDocument::from_pages("scan.pdf", ["  ", "\n"]);

        let err = indexer(embedder.clone(), &RagConfig::default())
            .index_parsed(doc)
            .await
            .unwrap_err();

        assert!(err.is_indexing_failure());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_embedding_is_batched() {
        let embedder = Arc::new(FakeEmbedding::default());
        let rag = RagConfig::default();
        let indexer = DocumentIndexer::new(Arc::new(FakeParser), embedder.clone(), &rag, 2)
            .unwrap();

        let index = indexer.index_parsed(three_page_doc()).await.unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_indexing() {
        let embedder = Arc::new(FakeEmbedding::failing());
        let err = indexer(embedder, &RagConfig::default())
            .index_parsed(three_page_doc())
            .await
            .unwrap_err();

        assert!(matches!(err, PdfQaError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_short_embedding_batch_aborts_indexing() {
        let embedder = Arc::new(FakeEmbedding::dropping_last());
        let err = indexer(embedder.clone(), &RagConfig::default())
            .index_parsed(three_page_doc())
            .await
            .unwrap_err();

        match err {
            PdfQaError::Embedding(msg) => {
                assert!(msg.contains("expected 3 embeddings, received 2"), "{msg}")
            }
            other => panic!("expected an embedding error, got {other}"),
        }
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_respects_top_k() {
        let embedder = Arc::new(FakeEmbedding::default());
        let rag = RagConfig {
            chunk_size: 100,
            chunk_overlap: 10,
            top_k: 4,
            ..Default::default()
        };
        let doc = ParsedDocument::from_pages("long.pdf", ["word ".repeat(400)]);
        let index = indexer(embedder, &rag).index_parsed(doc).await.unwrap();
        assert!(index.len() > 4);

        let results = index.retrieve("word").await.unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].rank, 1);
    }

    #[tokio::test]
    async fn test_retrieve_small_document_returns_all() {
        let embedder = Arc::new(FakeEmbedding::default());
        let doc = ParsedDocument::from_pages("short.pdf", ["Only one short page."]);
        let index = indexer(embedder, &RagConfig::default())
            .index_parsed(doc)
            .await
            .unwrap();

        let results = index.retrieve("anything").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.page, 1);
    }

    #[tokio::test]
    async fn test_min_score_filters_results() {
        let embedder = Arc::new(FakeEmbedding::default());
        let rag = RagConfig {
            min_score: Some(2.0),
            ..Default::default()
        };
        let index = indexer(embedder, &rag)
            .index_parsed(three_page_doc())
            .await
            .unwrap();

        // L2 scores never exceed 1.0
        assert!(index.retrieve("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parse_maps_parser_errors() {
        let embedder = Arc::new(FakeEmbedding::default());
        let indexer = indexer(embedder, &RagConfig::default());

        let err = indexer
            .parse(DocumentSource::Bytes {
                name: "bad.pdf".to_string(),
                bytes: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PdfQaError::Parse(_)));

        let doc = indexer
            .parse(DocumentSource::Bytes {
                name: "ok.pdf".to_string(),
                bytes: b"page one\x0cpage two".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn test_invalid_window_config() {
        let rag = RagConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        let result = DocumentIndexer::new(
            Arc::new(FakeParser),
            Arc::new(FakeEmbedding::default()),
            &rag,
            512,
        );
        assert!(matches!(result, Err(PdfQaError::Config(_))));
    }

    #[test]
    fn test_source_name() {
        let source = DocumentSource::from(PathBuf::from("data/manual.pdf"));
        assert_eq!(source.name(), "data/manual.pdf");
    }
}
