//! Chat sessions
//!
//! A session holds at most one loaded document together with the
//! question/answer history asked against it. History lives inside the
//! loaded document's state, so replacing the document drops the history
//! with it and a failed replacement leaves both untouched.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pdfqa_core::{DocumentInfo, PdfQaError, QaAnswer, QaRecord, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::indexer::{DocumentIndex, DocumentIndexer, DocumentSource};
use crate::RetrievalQa;

/// A document that is ready for questions, with its history
#[derive(Debug)]
struct ActiveDocument {
    index: Arc<DocumentIndex>,
    history: Vec<QaRecord>,
}

#[derive(Debug)]
enum SessionState {
    Empty,
    /// Indexing a new document; the previous one is kept until it succeeds
    Indexing { previous: Option<ActiveDocument> },
    Ready(ActiveDocument),
}

/// A validated question bound to the index it will be answered from
///
/// Taken under the session lock, answered outside it, then handed back to
/// [`QaSession::record_answer`].
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    question: String,
    index: Arc<DocumentIndex>,
}

impl PendingQuestion {
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }
}

/// Externally visible session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Empty,
    Indexing,
    Ready,
}

/// One user's conversation with one document at a time
#[derive(Debug)]
pub struct QaSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    state: SessionState,
}

impl QaSession {
    /// Create an empty session
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            state: SessionState::Empty,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            SessionState::Empty => SessionPhase::Empty,
            SessionState::Indexing { .. } => SessionPhase::Indexing,
            SessionState::Ready(_) => SessionPhase::Ready,
        }
    }

    fn active(&self) -> Option<&ActiveDocument> {
        match &self.state {
            SessionState::Ready(active) => Some(active),
            SessionState::Indexing { previous } => previous.as_ref(),
            SessionState::Empty => None,
        }
    }

    fn active_mut(&mut self) -> Option<&mut ActiveDocument> {
        match &mut self.state {
            SessionState::Ready(active) => Some(active),
            SessionState::Indexing { previous } => previous.as_mut(),
            SessionState::Empty => None,
        }
    }

    /// The document questions are answered from, if any.
    /// While a replacement is indexing this is still the previous document.
    pub fn document(&self) -> Option<&DocumentInfo> {
        self.active().map(|a| a.index.info())
    }

    /// Exchanges with the current document, oldest first
    pub fn history(&self) -> &[QaRecord] {
        self.active().map(|a| a.history.as_slice()).unwrap_or(&[])
    }

    /// Enter the indexing state
    ///
    /// Only one indexing run may be in flight per session.
    pub fn begin_indexing(&mut self) -> Result<()> {
        let previous = match std::mem::replace(&mut self.state, SessionState::Empty) {
            SessionState::Empty => None,
            SessionState::Ready(active) => Some(active),
            indexing @ SessionState::Indexing { .. } => {
                self.state = indexing;
                return Err(PdfQaError::IndexingInProgress);
            }
        };

        self.state = SessionState::Indexing { previous };
        tracing::debug!(session = %self.id, "Indexing started");
        Ok(())
    }

    /// Leave the indexing state with the outcome of the run
    ///
    /// Success replaces the document and starts an empty history. Failure
    /// restores whatever was loaded before and returns the error.
    pub fn finish_indexing(&mut self, result: Result<DocumentIndex>) -> Result<DocumentInfo> {
        let previous = match std::mem::replace(&mut self.state, SessionState::Empty) {
            SessionState::Indexing { previous } => previous,
            SessionState::Ready(active) => Some(active),
            SessionState::Empty => None,
        };

        match result {
            Ok(index) => {
                let info = index.info().clone();
                let cleared = previous.map(|p| p.history.len()).unwrap_or(0);

                self.state = SessionState::Ready(ActiveDocument {
                    index: Arc::new(index),
                    history: Vec::new(),
                });

                tracing::info!(
                    session = %self.id,
                    document = %info.name,
                    cleared_history = cleared,
                    "Document loaded"
                );
                Ok(info)
            }
            Err(e) => {
                self.state = match previous {
                    Some(active) => SessionState::Ready(active),
                    None => SessionState::Empty,
                };

                tracing::warn!(session = %self.id, error = %e, "Indexing failed");
                Err(e)
            }
        }
    }

    /// Index `source` and make it the session's document
    pub async fn load_document(
        &mut self,
        indexer: &DocumentIndexer,
        source: DocumentSource,
    ) -> Result<DocumentInfo> {
        self.begin_indexing()?;
        let result = indexer.index(source).await;
        self.finish_indexing(result)
    }

    /// Validate a question against the current state
    pub fn prepare_question(&self, question: &str) -> Result<PendingQuestion> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PdfQaError::Validation("Question must not be empty".to_string()));
        }

        let index = match &self.state {
            SessionState::Ready(active) => Arc::clone(&active.index),
            SessionState::Indexing { .. } => return Err(PdfQaError::IndexingInProgress),
            SessionState::Empty => return Err(PdfQaError::NoDocumentLoaded),
        };

        Ok(PendingQuestion {
            question: question.to_string(),
            index,
        })
    }

    /// Append a finished exchange to the history of the document it was
    /// asked about
    ///
    /// Returns false and records nothing when that document is no longer
    /// the session's document.
    pub fn record_answer(&mut self, pending: &PendingQuestion, answer: &QaAnswer) -> bool {
        let id = self.id;
        match self.active_mut() {
            Some(active) if Arc::ptr_eq(&active.index, &pending.index) => {
                active
                    .history
                    .push(QaRecord::new(pending.question.as_str(), answer.answer.clone()));
                true
            }
            _ => {
                tracing::info!(
                    session = %id,
                    document = %pending.index.info().name,
                    "Document replaced while answering; exchange not recorded"
                );
                false
            }
        }
    }

    /// Answer a question about the loaded document and record it
    pub async fn ask(&mut self, qa: &RetrievalQa, question: &str) -> Result<QaAnswer> {
        let pending = self.prepare_question(question)?;
        let answer = qa.answer(pending.index(), pending.question()).await?;
        self.record_answer(&pending, &answer);
        Ok(answer)
    }
}

impl Default for QaSession {
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
    use pdfqa_core::RagConfig;

    fn setup() -> (DocumentIndexer, RetrievalQa) {
        let rag = RagConfig::default();
        let indexer = DocumentIndexer::new(
            Arc::new(FakeParser),
            Arc::new(FakeEmbedding::default()),
            &rag,
            512,
        )
        .unwrap();
        let qa = RetrievalQa::new(Arc::new(FakeLlm::default()), &rag);
        (indexer, qa)
    }

    fn pdf(name: &str, text: &str) -> DocumentSource {
        DocumentSource::Bytes {
            name: name.to_string(),
            bytes: text.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_ask_without_document() {
        let (_, qa) = setup();
        let mut session = QaSession::new();

        assert_eq!(session.phase(), SessionPhase::Empty);
        let err = session.ask(&qa, "What is this?").await.unwrap_err();
        assert!(matches!(err, PdfQaError::NoDocumentLoaded));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let (indexer, qa) = setup();
        let mut session = QaSession::new();
        session
            .load_document(&indexer, pdf("a.pdf", "Some text."))
            .await
            .unwrap();

        let err = session.ask(&qa, "   ").await.unwrap_err();
        assert!(matches!(err, PdfQaError::Validation(_)));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_grows_and_clears_on_new_document() {
        let (indexer, qa) = setup();
        let mut session = QaSession::new();

        let info = session
            .load_document(&indexer, pdf("first.pdf", "The fee is ten dollars."))
            .await
            .unwrap();
        assert_eq!(info.name, "first.pdf");
        assert_eq!(session.phase(), SessionPhase::Ready);

        session.ask(&qa, "What is the fee?").await.unwrap();
        session.ask(&qa, "Who pays it?").await.unwrap();
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].question, "What is the fee?");

        session
            .load_document(&indexer, pdf("second.pdf", "Unrelated content."))
            .await
            .unwrap();
        assert!(session.history().is_empty());
        assert_eq!(session.document().unwrap().name, "second.pdf");
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_document() {
        let (indexer, qa) = setup();
        let mut session = QaSession::new();

        session
            .load_document(&indexer, pdf("good.pdf", "Payment is due monthly."))
            .await
            .unwrap();
        session.ask(&qa, "When is payment due?").await.unwrap();

        let err = session
            .load_document(&indexer, pdf("blank.pdf", "   \x0c  "))
            .await
            .unwrap_err();
        assert!(err.is_indexing_failure());

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(session.document().unwrap().name, "good.pdf");
        assert_eq!(session.history().len(), 1);
        session.ask(&qa, "Still answering?").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_first_load_returns_to_empty() {
        let (indexer, _) = setup();
        let mut session = QaSession::new();

        assert!(session
            .load_document(&indexer, pdf("empty.pdf", ""))
            .await
            .is_err());
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert!(session.document().is_none());
    }

    #[tokio::test]
    async fn test_questions_rejected_while_indexing() {
        let (indexer, qa) = setup();
        let mut session = QaSession::new();
        session
            .load_document(&indexer, pdf("a.pdf", "Text."))
            .await
            .unwrap();

        session.begin_indexing().unwrap();
        assert_eq!(session.phase(), SessionPhase::Indexing);
        // The previous document is still reported while indexing
        assert_eq!(session.document().unwrap().name, "a.pdf");

        assert!(matches!(
            session.begin_indexing(),
            Err(PdfQaError::IndexingInProgress)
        ));
        assert!(matches!(
            session.ask(&qa, "Anything?").await,
            Err(PdfQaError::IndexingInProgress)
        ));

        let result = indexer.index(pdf("b.pdf", "More text.")).await;
        session.finish_indexing(result).unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[tokio::test]
    async fn test_answer_for_replaced_document_not_recorded() {
        let (indexer, qa) = setup();
        let mut session = QaSession::new();
        session
            .load_document(&indexer, pdf("old.pdf", "The rent is due monthly."))
            .await
            .unwrap();

        let pending = session.prepare_question("  When is rent due? ").unwrap();
        assert_eq!(pending.question(), "When is rent due?");
        let answer = qa.answer(pending.index(), pending.question()).await.unwrap();

        session
            .load_document(&indexer, pdf("new.pdf", "A different lease."))
            .await
            .unwrap();

        assert!(!session.record_answer(&pending, &answer));
        assert!(session.history().is_empty());
        assert_eq!(session.document().unwrap().name, "new.pdf");
    }

    #[tokio::test]
    async fn test_answer_recorded_against_document_being_replaced() {
        let (indexer, qa) = setup();
        let mut session = QaSession::new();
        session
            .load_document(&indexer, pdf("a.pdf", "Text."))
            .await
            .unwrap();

        let pending = session.prepare_question("What is it?").unwrap();
        let answer = qa.answer(pending.index(), pending.question()).await.unwrap();

        // A failed replacement restores the document the answer belongs to
        session.begin_indexing().unwrap();
        assert!(session.record_answer(&pending, &answer));
        session
            .finish_indexing(Err(PdfQaError::Parse("bad".to_string())))
            .unwrap_err();

        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].question, "What is it?");
    }

    #[tokio::test]
    async fn test_failed_answer_not_recorded() {
        let rag = RagConfig::default();
        let (indexer, _) = setup();
        let qa = RetrievalQa::new(Arc::new(FakeLlm::failing()), &rag);
        let mut session = QaSession::new();
        session
            .load_document(&indexer, pdf("a.pdf", "Text."))
            .await
            .unwrap();

        assert!(session.ask(&qa, "Anything?").await.is_err());
        assert!(session.history().is_empty());
    }
}
