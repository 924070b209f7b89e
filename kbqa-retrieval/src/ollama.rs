//! Remote embedding provider backed by an Ollama server.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{Embedding, EmbeddingProvider, is_blank, log_shortfall};
use crate::error::{RagError, Result};

const PROVIDER: &str = "ollama";

/// An [`EmbeddingProvider`] that calls Ollama's `/api/embeddings` endpoint.
///
/// Each text is sent as its own request. Batches are processed with up to
/// `concurrency` requests in flight; results come back in input order
/// regardless of completion order. Every request is bounded by the
/// client-wide timeout.
///
/// # Example
///
/// ```rust,ignore
/// use kbqa_retrieval::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434", "nomic-embed-text", 768)?;
/// let vector = provider.embed("hello world").await?;
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
    concurrency: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider with a 30 second request timeout and four
    /// concurrent requests.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the model name is empty or the
    /// HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self> {
        let defaults = RetrievalConfig::default();
        Self::build(base_url.into(), model.into(), dimensions, &defaults)
    }

    /// Create a provider from the remote settings in `config`.
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Self::build(
            config.ollama_base_url.clone(),
            config.remote_embedding_model.clone(),
            config.dimension(),
            config,
        )
    }

    fn build(
        base_url: String,
        model: String,
        dimensions: usize,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(RagError::ConfigError("remote embedding model must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimensions,
            concurrency: config.embedding_concurrency.max(1),
        })
    }

    /// Set how many requests a batch may have in flight.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url)
    }

    fn failure(message: String) -> RagError {
        RagError::EmbeddingError { provider: PROVIDER.into(), message }
    }
}

// ── Ollama API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let request = EmbeddingRequest { model: &self.model, prompt: text };
        let response =
            self.client.post(self.endpoint()).json(&request).send().await.map_err(|e| {
                if e.is_timeout() {
                    Self::failure(format!("request timed out: {e}"))
                } else {
                    Self::failure(format!("request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = PROVIDER, %status, "API error");
            return Err(Self::failure(format!("API returned {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Self::failure(format!("failed to parse response: {e}")))?;

        match parsed.embedding {
            Some(vector) if !vector.is_empty() => Ok(vector),
            _ => Err(Self::failure("response carried no embedding".into())),
        }
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            concurrency = self.concurrency,
            "embedding batch"
        );

        // owned texts so the buffered futures borrow nothing from the slice
        let inputs: Vec<(usize, String)> =
            texts.iter().map(|text| text.to_string()).enumerate().collect();

        let results: Vec<Option<Embedding>> = stream::iter(inputs)
            .map(|(input_index, text)| async move {
                if is_blank(&text) {
                    warn!(provider = PROVIDER, input_index, "skipping blank text");
                    return None;
                }
                match self.embed(&text).await {
                    Ok(vector) => Some(Embedding { input_index, vector }),
                    Err(e) => {
                        let preview: String = text.chars().take(100).collect();
                        warn!(provider = PROVIDER, input_index, error = %e, %preview, "text skipped");
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let embeddings: Vec<Embedding> = results.into_iter().flatten().collect();
        log_shortfall(PROVIDER, texts.len(), embeddings.len());
        Ok(embeddings)
    }
}
