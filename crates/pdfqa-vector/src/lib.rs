//! PDFQA Vector - Embeddings and nearest-neighbor search
//!
//! Provides the embedding service clients (OpenAI, Ollama) and the
//! in-memory exact index the document windows are searched in.

pub mod embedding;
pub mod index;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use index::VectorIndex;
