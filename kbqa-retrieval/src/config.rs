//! Configuration for the retrieval engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default local sentence-embedding model.
pub const DEFAULT_LOCAL_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
/// Output width of [`DEFAULT_LOCAL_MODEL`].
pub const DEFAULT_LOCAL_DIMENSION: usize = 384;
/// Default Ollama server.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Default remote embedding model served by Ollama.
pub const DEFAULT_REMOTE_MODEL: &str = "dengcao/Qwen3-Embedding-0.6B:Q8_0";
/// Output width of [`DEFAULT_REMOTE_MODEL`].
pub const DEFAULT_REMOTE_DIMENSION: usize = 1024;
/// Default cross-encoder used for reranking.
pub const DEFAULT_RERANKER_MODEL: &str = "BAAI/bge-reranker-base";

/// Which embedding backend produces vectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// In-process sentence-embedding model.
    Local,
    /// HTTP embedding endpoint, one request per text.
    #[default]
    Remote,
}

/// Configuration parameters for embedding, indexing and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Embedding backend selection.
    pub embedding_backend: EmbeddingBackend,
    /// Declared embedding width. `None` uses the backend default model's width.
    pub embedding_dimension: Option<usize>,
    /// Model name for the local backend.
    pub local_embedding_model: String,
    /// Base URL of the Ollama server used by the remote backend.
    pub ollama_base_url: String,
    /// Model name for the remote backend.
    pub remote_embedding_model: String,
    /// Hard deadline for each individual remote embedding request.
    pub request_timeout_secs: u64,
    /// Maximum number of remote embedding requests in flight.
    pub embedding_concurrency: usize,
    /// Number of results returned when reranking is off.
    pub top_k: usize,
    /// Size of the recall set fetched before reranking.
    pub initial_top_k: usize,
    /// Number of results kept after reranking.
    pub rerank_top_k: usize,
    /// Whether to load and use the cross-encoder reranker.
    pub use_reranker: bool,
    /// Cross-encoder model name.
    pub reranker_model: String,
    /// Where the similarity index is persisted.
    pub index_path: PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_backend: EmbeddingBackend::Remote,
            embedding_dimension: None,
            local_embedding_model: DEFAULT_LOCAL_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_URL.to_string(),
            remote_embedding_model: DEFAULT_REMOTE_MODEL.to_string(),
            request_timeout_secs: 30,
            embedding_concurrency: 4,
            top_k: 10,
            initial_top_k: 30,
            rerank_top_k: 10,
            use_reranker: true,
            reranker_model: DEFAULT_RERANKER_MODEL.to_string(),
            index_path: PathBuf::from("vector_db/kbqa_index.bin"),
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// The declared embedding width for the selected backend.
    pub fn dimension(&self) -> usize {
        self.embedding_dimension.unwrap_or(match self.embedding_backend {
            EmbeddingBackend::Local => DEFAULT_LOCAL_DIMENSION,
            EmbeddingBackend::Remote => DEFAULT_REMOTE_DIMENSION,
        })
    }

    /// Per-request timeout for remote calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The index file location.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any result count, the
    /// concurrency limit, the timeout or an explicit dimension is zero, or
    /// if the index path is empty.
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("top_k", self.top_k),
            ("initial_top_k", self.initial_top_k),
            ("rerank_top_k", self.rerank_top_k),
            ("embedding_concurrency", self.embedding_concurrency),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(RagError::ConfigError(format!("{name} must be greater than zero")));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(RagError::ConfigError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.embedding_dimension == Some(0) {
            return Err(RagError::ConfigError(
                "embedding_dimension must be greater than zero".to_string(),
            ));
        }
        if self.index_path.as_os_str().is_empty() {
            return Err(RagError::ConfigError("index_path must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Select the embedding backend.
    pub fn embedding_backend(mut self, backend: EmbeddingBackend) -> Self {
        self.config.embedding_backend = backend;
        self
    }

    /// Declare the embedding width.
    pub fn embedding_dimension(mut self, dimension: usize) -> Self {
        self.config.embedding_dimension = Some(dimension);
        self
    }

    /// Set the local embedding model name.
    pub fn local_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.local_embedding_model = model.into();
        self
    }

    /// Set the Ollama base URL.
    pub fn ollama_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.ollama_base_url = url.into();
        self
    }

    /// Set the remote embedding model name.
    pub fn remote_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.remote_embedding_model = model.into();
        self
    }

    /// Set the per-request timeout in seconds.
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set how many remote embedding requests may run at once.
    pub fn embedding_concurrency(mut self, limit: usize) -> Self {
        self.config.embedding_concurrency = limit;
        self
    }

    /// Set the number of results returned without reranking.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the recall set size used ahead of reranking.
    pub fn initial_top_k(mut self, k: usize) -> Self {
        self.config.initial_top_k = k;
        self
    }

    /// Set the number of results kept after reranking.
    pub fn rerank_top_k(mut self, k: usize) -> Self {
        self.config.rerank_top_k = k;
        self
    }

    /// Enable or disable the reranker.
    pub fn use_reranker(mut self, enabled: bool) -> Self {
        self.config.use_reranker = enabled;
        self
    }

    /// Set the cross-encoder model name.
    pub fn reranker_model(mut self, model: impl Into<String>) -> Self {
        self.config.reranker_model = model.into();
        self
    }

    /// Set the index file location.
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_path = path.into();
        self
    }

    /// Build the [`RetrievalConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RetrievalConfig::validate`].
    pub fn build(self) -> Result<RetrievalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
