//! PDF QA RAG - Retrieval-augmented question answering over one document
//!
//! This crate ties the pipeline together:
//! - [`DocumentIndexer`] turns a PDF into a searchable [`DocumentIndex`]
//! - [`RetrievalQa`] answers a question from the top-k retrieved windows
//! - [`QaSession`] owns the loaded document and its chat history
//!
//! Author: hephaex@gmail.com

use pdfqa_core::{LlmClient, QaAnswer, RagConfig, Result, RetrievedChunk};
use std::sync::Arc;
use std::time::Instant;

pub mod indexer;
pub mod llm;
pub mod session;

#[cfg(test)]
mod testing;

pub use indexer::{DocumentIndex, DocumentIndexer, DocumentSource};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use session::{PendingQuestion, QaSession, SessionPhase};

/// Context line used when retrieval returns nothing
pub const NO_CONTEXT_NOTICE: &str = "No relevant passages were found in the document.";

const SYSTEM_INSTRUCTION: &str = "You are an assistant that answers questions about a \
single PDF document. Use only the numbered passages in the context to answer.";

// ============================================================================
// Retrieval QA Chain
// ============================================================================

/// Retrieval-augmented QA chain
///
/// Stateless: the same question against the same index always produces
/// the same prompt, and history never leaks into it.
pub struct RetrievalQa {
    llm: Arc<dyn LlmClient>,
    max_context_length: usize,
}

impl RetrievalQa {
    /// Create a new chain
    pub fn new(llm: Arc<dyn LlmClient>, config: &RagConfig) -> Self {
        Self {
            llm,
            max_context_length: config.max_context_length,
        }
    }

    /// Model used for completions
    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Answer a question from the document held by `index`
    pub async fn answer(&self, index: &DocumentIndex, question: &str) -> Result<QaAnswer> {
        let start = Instant::now();

        tracing::info!(
            document = %index.info().name,
            model = self.llm.model(),
            "Processing question"
        );

        let retrieved = index.retrieve(question).await?;
        let (prompt, sources) = self.build_prompt(question, retrieved);

        let answer = self.llm.generate(&prompt).await?;
        let processing_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            sources = sources.len(),
            processing_time_ms,
            "Question answered"
        );

        Ok(QaAnswer {
            question: question.to_string(),
            answer,
            sources,
            processing_time_ms,
        })
    }

    /// Build the prompt; returns it with the windows that fit into the context
    pub fn build_prompt(
        &self,
        question: &str,
        retrieved: Vec<RetrievedChunk>,
    ) -> (String, Vec<RetrievedChunk>) {
        let mut builder = PromptBuilder::new().system(SYSTEM_INSTRUCTION);
        let mut sources = Vec::with_capacity(retrieved.len());
        let mut context_len = 0;

        for result in retrieved {
            let section = format!(
                "[{}] (page {})\n{}",
                result.rank, result.chunk.page, result.chunk.content
            );
            let section_len = section.chars().count();

            // Always keep the best window, even when it alone exceeds the limit
            if !sources.is_empty() && context_len + section_len > self.max_context_length {
                tracing::debug!(
                    dropped_rank = result.rank,
                    "Context limit reached"
                );
                break;
            }

            context_len += section_len;
            builder = builder.add_context(section);
            sources.push(result);
        }

        if sources.is_empty() {
            builder = builder.add_context(NO_CONTEXT_NOTICE);
        }

        let prompt = builder
            .question(question)
            .add_instruction("Answer only from the passages above.")
            .add_instruction(
                "If the passages do not contain the answer, say that you don't know \
                 instead of making one up.",
            )
            .add_instruction("Keep the answer concise.")
            .build();

        (prompt, sources)
    }
}

// ============================================================================
// Prompt Builder
// ============================================================================

/// Helper for building prompts
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    question: String,
    instructions: Vec<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self {
            system_instruction: String::new(),
            context_sections: Vec::new(),
            question: String::new(),
            instructions: Vec::new(),
        }
    }

    /// Set system instruction
    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Add a context section
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Set the question
    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    /// Add an instruction
    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        let mut prompt = String::new();

        if !self.system_instruction.is_empty() {
            prompt.push_str("<s>\n");
            prompt.push_str(&self.system_instruction);
            prompt.push_str("\n</s>\n\n");
        }

        if !self.context_sections.is_empty() {
            prompt.push_str("<context>\n");
            for section in &self.context_sections {
                prompt.push_str(section);
                prompt.push_str("\n\n");
            }
            prompt.push_str("</context>\n\n");
        }

        if !self.question.is_empty() {
            prompt.push_str("<question>\n");
            prompt.push_str(&self.question);
            prompt.push_str("\n</question>\n\n");
        }

        if !self.instructions.is_empty() {
            prompt.push_str("<instructions>\n");
            for (i, inst) in self.instructions.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, inst));
            }
            prompt.push_str("</instructions>\n");
        }

        prompt
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEmbedding, FakeLlm, FakeParser};
    use pdfqa_core::{DocumentChunk, PdfQaError};
    use pdfqa_parser::ParsedDocument;

    fn retrieved(rank: usize, page: u32, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: DocumentChunk::new(rank as u32 - 1, content, page),
            rank,
            score: 1.0 / rank as f32,
        }
    }

    async fn contract_index(rag: &RagConfig) -> DocumentIndex {
        let indexer = DocumentIndexer::new(
            Arc::new(FakeParser),
            Arc::new(FakeEmbedding::default()),
            rag,
            512,
        )
        .unwrap();
        let doc = ParsedDocument::from_pages(
            "contract.pdf",
            [
                "This agreement starts on the first of March.",
                "The contract term is two years from the start date.",
                "Either party may terminate with ninety days notice.",
            ],
        );
        indexer.index_parsed(doc).await.unwrap()
    }

    #[test]
    fn test_prompt_builder() {
        let prompt = PromptBuilder::new()
            .system("You are a helpful assistant.")
            .add_context("[1] Context from page 1")
            .add_context("[2] Context from page 4")
            .question("What is the answer?")
            .add_instruction("Be concise")
            .add_instruction("Cite sources")
            .build();

        assert!(prompt.starts_with("<s>\n"));
        assert!(prompt.contains("<context>\n[1] Context from page 1\n\n[2]"));
        assert!(prompt.contains("<question>\nWhat is the answer?\n</question>"));
        assert!(prompt.contains("2. Cite sources"));
    }

    #[test]
    fn test_prompt_contains_numbered_passages() {
        let qa = RetrievalQa::new(Arc::new(FakeLlm::default()), &RagConfig::default());
        let (prompt, sources) = qa.build_prompt(
            "What is the term?",
            vec![retrieved(1, 2, "The term is two years."), retrieved(2, 1, "Preamble.")],
        );

        assert_eq!(sources.len(), 2);
        assert!(prompt.contains("[1] (page 2)\nThe term is two years."));
        assert!(prompt.contains("[2] (page 1)\nPreamble."));
        assert!(!prompt.contains(NO_CONTEXT_NOTICE));
        assert!(prompt.contains("don't know"));
    }

    #[test]
    fn test_empty_retrieval_uses_notice() {
        let qa = RetrievalQa::new(Arc::new(FakeLlm::default()), &RagConfig::default());
        let (prompt, sources) = qa.build_prompt("Anything?", Vec::new());

        assert!(sources.is_empty());
        assert!(prompt.contains(NO_CONTEXT_NOTICE));
        assert!(prompt.contains("Anything?"));
    }

    #[test]
    fn test_context_limit_drops_lower_ranks() {
        let rag = RagConfig {
            max_context_length: 50,
            ..Default::default()
        };
        let qa = RetrievalQa::new(Arc::new(FakeLlm::default()), &rag);
        let long = "x".repeat(60);
        let (prompt, sources) = qa.build_prompt(
            "q",
            vec![retrieved(1, 1, &long), retrieved(2, 1, "short")],
        );

        // The best window is kept even though it is over the limit
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].rank, 1);
        assert!(!prompt.contains("short"));
    }

    #[tokio::test]
    async fn test_answer_returns_sources_and_answer() {
        let rag = RagConfig::default();
        let index = contract_index(&rag).await;
        let llm = Arc::new(FakeLlm::default());
        let qa = RetrievalQa::new(llm.clone(), &rag);

        let answer = qa.answer(&index, "What is the contract term?").await.unwrap();

        assert_eq!(answer.question, "What is the contract term?");
        assert!(answer.answer.starts_with("answer from"));
        assert!(!answer.sources.is_empty());
        assert!(answer.sources.len() <= rag.top_k);
        assert_eq!(llm.prompts().len(), 1);
        assert!(llm.prompts()[0].contains("What is the contract term?"));
    }

    #[tokio::test]
    async fn test_same_question_same_prompt() {
        let rag = RagConfig::default();
        let index = contract_index(&rag).await;
        let llm = Arc::new(FakeLlm::default());
        let qa = RetrievalQa::new(llm.clone(), &rag);

        let first = qa.answer(&index, "When can a party terminate?").await.unwrap();
        let second = qa.answer(&index, "When can a party terminate?").await.unwrap();

        assert_eq!(first.answer, second.answer);
        let prompts = llm.prompts();
        assert_eq!(prompts[0], prompts[1]);
    }

    #[tokio::test]
    async fn test_llm_failure_is_query_failure() {
        let rag = RagConfig::default();
        let index = contract_index(&rag).await;
        let qa = RetrievalQa::new(Arc::new(FakeLlm::failing()), &rag);

        let err = qa.answer(&index, "What is the term?").await.unwrap_err();
        assert!(matches!(err, PdfQaError::Llm(_)));
        assert!(err.is_query_failure());
    }
}
