//! Error types for the `kbqa-retrieval` crate.

use thiserror::Error;

/// Errors that can occur in retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The similarity index rejected its input or a query.
    #[error("Index error: {0}")]
    IndexError(String),

    /// Reading or writing a persisted index failed.
    #[error("Persistence error ({path}): {message}")]
    PersistenceError {
        /// The index file involved.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RagError {
    pub(crate) fn persistence(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::PersistenceError { path: path.display().to_string(), message: message.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
