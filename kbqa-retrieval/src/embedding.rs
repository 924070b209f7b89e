//! Embedding provider trait and backend selection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{EmbeddingBackend, RetrievalConfig};
use crate::error::Result;
use crate::ollama::OllamaEmbeddingProvider;

/// A vector produced for one input text.
///
/// `input_index` is the position of the text in the batch it came from.
/// Blank or failed inputs produce no `Embedding`, so positions can skip.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// Position of the source text in the input batch.
    pub input_index: usize,
    /// The embedding vector.
    pub vector: Vec<f32>,
}

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap a specific backend (an in-process model, an HTTP
/// service) behind a unified async interface. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) calls
/// [`embed`](EmbeddingProvider::embed) once per text, skipping blank texts
/// and texts whose embedding fails; backends that support native batching
/// should override it.
///
/// # Example
///
/// ```rust,ignore
/// use kbqa_retrieval::EmbeddingProvider;
///
/// let embeddings = provider.embed_batch(&["first", "  ", "third"]).await?;
/// // the blank text is skipped
/// assert_eq!(embeddings[1].input_index, 2);
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// The declared width of vectors from this provider.
    ///
    /// The width actually used by an index is taken from produced vectors.
    fn dimensions(&self) -> usize;

    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of texts, preserving order.
    ///
    /// Per-text failures are logged and skipped. An `Err` means the batch
    /// as a whole could not be processed.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for (input_index, text) in texts.iter().enumerate() {
            if is_blank(text) {
                warn!(provider = self.name(), input_index, "skipping blank text");
                continue;
            }
            match self.embed(text).await {
                Ok(vector) => embeddings.push(Embedding { input_index, vector }),
                Err(e) => warn!(provider = self.name(), input_index, error = %e, "text skipped"),
            }
        }
        log_shortfall(self.name(), texts.len(), embeddings.len());
        Ok(embeddings)
    }
}

pub(crate) fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

pub(crate) fn log_shortfall(provider: &str, requested: usize, produced: usize) {
    if produced != requested {
        warn!(provider, requested, produced, "not every text produced an embedding");
    }
}

/// Construct the embedding provider selected by `config`.
///
/// A local backend that cannot be loaded, including a build without the
/// `local` feature, falls back to the remote backend.
///
/// # Errors
///
/// Returns an error if the remote HTTP client cannot be constructed.
pub fn create_embedding_provider(config: &RetrievalConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if config.embedding_backend == EmbeddingBackend::Local {
        if let Some(provider) = load_local(config) {
            info!(provider = provider.name(), "embedding provider loaded");
            return Ok(provider);
        }
        warn!(
            model = %config.local_embedding_model,
            "local embedding model unavailable, falling back to remote embeddings"
        );
    }

    // a local fallback must not inherit the local model's default width
    let remote = RetrievalConfig { embedding_backend: EmbeddingBackend::Remote, ..config.clone() };
    let provider = OllamaEmbeddingProvider::from_config(&remote)?;
    info!(
        provider = provider.name(),
        model = %config.remote_embedding_model,
        base_url = %config.ollama_base_url,
        "embedding provider ready"
    );
    Ok(Arc::new(provider))
}

#[cfg(feature = "local")]
fn load_local(config: &RetrievalConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    match crate::local::FastEmbedProvider::load(&config.local_embedding_model, config.dimension()) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            warn!(error = %e, "failed to load local embedding model");
            None
        }
    }
}

#[cfg(not(feature = "local"))]
fn load_local(_config: &RetrievalConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    warn!("built without the `local` feature");
    None
}
