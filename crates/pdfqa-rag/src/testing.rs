//! Deterministic stand-ins for the parser, embedding service and LLM

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pdfqa_core::{LlmClient, PdfQaError, Result};
use pdfqa_parser::{DocumentParser, ParsedDocument, ParserError};
use pdfqa_vector::EmbeddingClient;

/// Treats input bytes as UTF-8 text with form feeds between pages
pub struct FakeParser;

impl DocumentParser for FakeParser {
    fn parse(&self, path: &Path) -> pdfqa_parser::Result<ParsedDocument> {
        let bytes = std::fs::read(path).map_err(|e| ParserError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        self.parse_bytes(&path.display().to_string(), &bytes)
    }

    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> pdfqa_parser::Result<ParsedDocument> {
        if bytes.is_empty() {
            return Err(ParserError::CorruptedFile(name.to_string()));
        }
        let text = String::from_utf8_lossy(bytes);
        Ok(ParsedDocument::from_pages(name, text.split('\x0c')))
    }
}

#[derive(Default, Clone, Copy)]
enum EmbeddingMode {
    #[default]
    Normal,
    Fail,
    /// Answer every batch with one vector too few
    DropLast,
}

/// Letter-frequency embeddings
#[derive(Default)]
pub struct FakeEmbedding {
    calls: AtomicUsize,
    mode: EmbeddingMode,
}

impl FakeEmbedding {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            mode: EmbeddingMode::Fail,
        }
    }

    pub fn dropping_last() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            mode: EmbeddingMode::DropLast,
        }
    }

    /// Number of embedding requests made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 27];
        for c in text.chars().flat_map(char::to_lowercase) {
            match c {
                'a'..='z' => v[(c as u8 - b'a') as usize] += 1.0,
                _ => v[26] += 1.0,
            }
        }
        let total: f32 = v.iter().sum::<f32>().max(1.0);
        v.iter_mut().for_each(|x| *x /= total);
        v
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| PdfQaError::Embedding("no vector returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| Self::vector(t)).collect();
        match self.mode {
            EmbeddingMode::Normal => {}
            EmbeddingMode::Fail => {
                return Err(PdfQaError::Embedding("embedding service unavailable".to_string()));
            }
            EmbeddingMode::DropLast => {
                vectors.pop();
            }
        }
        Ok(vectors)
    }
}

/// Records prompts and answers with a digest of the prompt
#[derive(Default)]
pub struct FakeLlm {
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeLlm {
    pub fn failing() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(PdfQaError::Llm("completion service unavailable".to_string()));
        }
        Ok(format!("answer from {} prompt characters", prompt.chars().count()))
    }

    fn model(&self) -> &str {
        "fake"
    }
}
