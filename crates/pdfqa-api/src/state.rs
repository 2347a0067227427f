//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use pdfqa_core::{AppConfig, LlmClient, Result};
use pdfqa_parser::{DocumentParser, PdfParser};
use pdfqa_rag::{create_llm_client, DocumentIndexer, QaSession, RetrievalQa};
use pdfqa_vector::{create_embedding_client, EmbeddingClient};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A chat session shared between requests
pub type SharedSession = Arc<Mutex<QaSession>>;

/// Registry slot for a session
struct SessionEntry {
    session: SharedSession,
    last_used: Instant,
}

impl SessionEntry {
    fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_used) >= timeout
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Set once the listener is bound, cleared on shutdown
    pub is_ready: AtomicBool,
    /// Builds document indexes for every session
    pub indexer: Arc<DocumentIndexer>,
    /// Question answering chain
    pub qa: Arc<RetrievalQa>,
    /// Live sessions by id
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl AppState {
    /// Create new application state from its components
    pub fn new(config: AppConfig, indexer: DocumentIndexer, qa: RetrievalQa) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(false),
            indexer: Arc::new(indexer),
            qa: Arc::new(qa),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Wire up the PDF parser and the configured embedding/completion services
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let parser: Arc<dyn DocumentParser> = Arc::new(PdfParser::new());
        let embedder: Arc<dyn EmbeddingClient> =
            Arc::from(create_embedding_client(&config.llm)?);
        let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);

        let indexer = DocumentIndexer::from_config(&config, parser, embedder)?;
        let qa = RetrievalQa::new(llm, &config.rag);

        Ok(Self::new(config, indexer, qa))
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }

    /// Register a new empty session
    pub async fn create_session(&self) -> (Uuid, SharedSession) {
        let session = QaSession::new();
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));

        self.sessions.write().await.insert(
            id,
            SessionEntry {
                session: Arc::clone(&shared),
                last_used: Instant::now(),
            },
        );
        tracing::info!(session = %id, "Session created");

        (id, shared)
    }

    /// Look up a session and mark it used
    ///
    /// A session idle for longer than the configured timeout is dropped
    /// here even if the periodic sweep has not reached it yet.
    pub async fn session(&self, id: Uuid) -> std::result::Result<SharedSession, AppError> {
        let timeout = self.config.server.session_idle_timeout();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        match sessions.get_mut(&id) {
            Some(entry) if !entry.is_idle(now, timeout) => {
                entry.last_used = now;
                Ok(Arc::clone(&entry.session))
            }
            Some(_) => {
                sessions.remove(&id);
                tracing::info!(session = %id, "Session expired");
                Err(AppError::NotFound(format!("Session {id}")))
            }
            None => Err(AppError::NotFound(format!("Session {id}"))),
        }
    }

    /// Drop every session idle for longer than the configured timeout
    pub async fn evict_idle_sessions(&self) -> usize {
        let timeout = self.config.server.session_idle_timeout();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, entry| !entry.is_idle(now, timeout));

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }

    /// Periodically evict idle sessions for as long as the state is alive
    pub fn spawn_session_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let state = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match state.upgrade() {
                    Some(state) => {
                        state.evict_idle_sessions().await;
                    }
                    None => break,
                }
            }
        })
    }

    /// Drop a session with its document and history
    pub async fn remove_session(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(session = %id, "Session removed");
        }
        removed
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
