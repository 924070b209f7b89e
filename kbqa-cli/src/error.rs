//! Error types for the question-answering host.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while setting up the host.
///
/// Runtime failures (unreachable services, unreadable documents) are
/// logged and degrade to fallback answers instead.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Retrieval(#[from] kbqa_retrieval::RagError),
}

/// A convenience type alias for `Result<T, CliError>`.
pub type Result<T> = std::result::Result<T, CliError>;
