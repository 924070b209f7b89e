//! Host configuration, read from an optional TOML file.
//!
//! Every section and field is optional; omitted values keep their
//! defaults.
//!
//! ```toml
//! [documents]
//! file_paths = ["documents/handbook.txt"]
//! chunk_size = 800
//! chunk_overlap = 150
//!
//! [retrieval]
//! embedding_backend = "remote"
//! use_reranker = false
//!
//! [generation]
//! model = "qwen2.5:7b"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use kbqa_retrieval::RetrievalConfig;
use kbqa_retrieval::config::DEFAULT_OLLAMA_URL;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 800;
/// Default number of characters shared by neighbouring chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;
/// Default answer model served by Ollama.
pub const DEFAULT_QA_MODEL: &str = "qwen2.5:7b";

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub documents: DocumentsConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
}

/// Which files to index and how to chunk them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentsConfig {
    pub file_paths: Vec<PathBuf>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            file_paths: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Answer generation through Ollama's `/api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_QA_MODEL.to_string(),
            timeout_secs: 60,
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load the configuration from `path`, or use defaults when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| {
                    CliError::ConfigRead { path: path.to_path_buf(), source }
                })?;
                Self::from_toml(&text)
                    .map_err(|source| CliError::ConfigParse { path: path.to_path_buf(), source })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from TOML text without validating it.
    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] for a zero chunk size, an overlap not
    /// smaller than the chunk size, an empty answer model or a zero
    /// generation timeout, and [`CliError::Retrieval`] for invalid
    /// retrieval settings.
    pub fn validate(&self) -> Result<()> {
        let docs = &self.documents;
        if docs.chunk_size == 0 {
            return Err(CliError::Config("chunk_size must be greater than zero".into()));
        }
        if docs.chunk_overlap >= docs.chunk_size {
            return Err(CliError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                docs.chunk_overlap, docs.chunk_size
            )));
        }
        if self.generation.model.trim().is_empty() {
            return Err(CliError::Config("generation model must not be empty".into()));
        }
        if self.generation.timeout_secs == 0 {
            return Err(CliError::Config("generation timeout must be greater than zero".into()));
        }
        self.retrieval.validate()?;
        Ok(())
    }
}
