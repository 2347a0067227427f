//! PDFQA Configuration Management
//!
//! Handles configuration from environment variables, `.env` files and
//! TOML config files with sensible defaults for local use.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// LLM and embedding provider configuration
    pub llm: LlmConfig,

    /// Indexing and retrieval configuration
    pub rag: RagConfig,

    /// Document source configuration
    pub document: DocumentConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Full startup load: `.env`, optional TOML file, environment overrides,
    /// then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Same sources as [`AppConfig::load`] without the cross-field checks,
    /// for commands that never reach the hosted services.
    pub fn load_unvalidated(path: Option<&Path>) -> Result<Self, ConfigError> {
        if dotenv::dotenv().is_ok() {
            tracing::debug!("Loaded environment from .env");
        }

        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("PDFQA_CONFIG").ok().map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Override values from a key lookup (environment variables in production)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", port)?;
        }
        if let Some(origins) = lookup("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(secs) = lookup("SESSION_IDLE_TIMEOUT_SECS") {
            self.server.session_idle_timeout_secs = parse_value("SESSION_IDLE_TIMEOUT_SECS", secs)?;
        }

        // LLM
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Some(temperature) = lookup("LLM_TEMPERATURE") {
            self.llm.temperature = parse_value("LLM_TEMPERATURE", temperature)?;
        }

        // RAG
        if let Some(size) = lookup("CHUNK_SIZE") {
            self.rag.chunk_size = parse_value("CHUNK_SIZE", size)?;
        }
        if let Some(overlap) = lookup("CHUNK_OVERLAP") {
            self.rag.chunk_overlap = parse_value("CHUNK_OVERLAP", overlap)?;
        }
        if let Some(k) = lookup("RETRIEVAL_TOP_K") {
            self.rag.top_k = parse_value("RETRIEVAL_TOP_K", k)?;
        }
        if let Some(metric) = lookup("DISTANCE_METRIC") {
            self.rag.metric = metric.parse()?;
        }

        // Document
        if let Some(path) = lookup("LOCAL_PDF_PATH") {
            self.document.local_pdf_path = PathBuf::from(path);
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("LOG_JSON") {
            self.logging.json_format = parse_value("LOG_JSON", json)?;
        }

        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rag.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHUNK_SIZE".to_string(),
                value: "0".to_string(),
            });
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "CHUNK_OVERLAP".to_string(),
                value: format!(
                    "{} (must be smaller than chunk size {})",
                    self.rag.chunk_overlap, self.rag.chunk_size
                ),
            });
        }
        if self.rag.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RETRIEVAL_TOP_K".to_string(),
                value: "0".to_string(),
            });
        }
        if self.llm.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding_batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        if matches!(self.llm.provider, LlmProvider::OpenAI | LlmProvider::Azure)
            && self.llm.openai_api_key.is_none()
        {
            return Err(ConfigError::MissingRequired("OPENAI_API_KEY".to_string()));
        }

        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in bytes (uploads are base64 encoded)
    pub max_body_size: usize,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,

    /// Sessions unused for this long are dropped with their index
    pub session_idle_timeout_secs: u64,
}

impl ServerConfig {
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_size: 20 * 1024 * 1024, // 20MB
            cors_enabled: true,
            cors_origins: vec![],
            session_idle_timeout_secs: 3600,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Completion model name
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Texts per embedding request
    pub embedding_batch_size: usize,
}

impl LlmConfig {
    /// OpenAI base URL, falling back to the public endpoint
    pub fn openai_base_url(&self) -> &str {
        self.openai_base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout_secs: 60,
            embedding_batch_size: 512,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Distance used by the nearest-neighbor index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean distance
    #[default]
    L2,
    /// Cosine similarity
    Cosine,
}

impl std::str::FromStr for DistanceMetric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "cosine" => Ok(Self::Cosine),
            _ => Err(ConfigError::InvalidValue {
                key: "DISTANCE_METRIC".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Indexing and retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Window size in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive windows
    pub chunk_overlap: usize,

    /// Number of windows retrieved per question
    pub top_k: usize,

    /// Drop retrieved windows scoring below this
    pub min_score: Option<f32>,

    /// Distance metric for the index
    pub metric: DistanceMetric,

    /// Maximum context length in the prompt (characters)
    pub max_context_length: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 4,
            min_score: None,
            metric: DistanceMetric::L2,
            max_context_length: 8000,
        }
    }
}

/// Document source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// PDF offered by the "use local file" option
    pub local_pdf_path: PathBuf,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            local_pdf_path: PathBuf::from("data/your_pdf_file.pdf"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.chunk_overlap, 100);
        assert_eq!(config.rag.top_k, 4);
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.rag.metric, DistanceMetric::L2);
        assert_eq!(config.server.session_idle_timeout_secs, 3600);
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "Ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(lookup_from(&[
                ("API_PORT", "9000"),
                ("OPENAI_API_KEY", "sk-test"),
                ("CHUNK_SIZE", "500"),
                ("CHUNK_OVERLAP", "50"),
                ("RETRIEVAL_TOP_K", "6"),
                ("DISTANCE_METRIC", "cosine"),
                ("LOCAL_PDF_PATH", "/tmp/contract.pdf"),
                ("CORS_ORIGINS", "http://a.test, ,http://b.test"),
                ("SESSION_IDLE_TIMEOUT_SECS", "600"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.llm.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.rag.chunk_size, 500);
        assert_eq!(config.rag.chunk_overlap, 50);
        assert_eq!(config.rag.top_k, 6);
        assert_eq!(config.rag.metric, DistanceMetric::Cosine);
        assert_eq!(
            config.document.local_pdf_path,
            PathBuf::from("/tmp/contract.pdf")
        );
        assert_eq!(config.server.cors_origins.len(), 2);
        assert_eq!(config.server.session_idle_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_apply_env_rejects_bad_number() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(lookup_from(&[("API_PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "API_PORT"));
    }

    #[test]
    fn test_validate_requires_api_key_for_openai() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));

        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Ollama;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_overlap_smaller_than_chunk() {
        let mut config = AppConfig::default();
        config.llm.openai_api_key = Some("sk-test".to_string());
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(config.validate().is_err());

        config.rag.chunk_overlap = 100;
        config.rag.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rag]\nchunk_size = 800\n\n[llm]\nprovider = \"ollama\"\nmodel = \"llama3\""
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rag.chunk_size, 800);
        assert_eq!(config.rag.chunk_overlap, 100);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = AppConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
