//! Retrieval orchestrator.
//!
//! The [`Retriever`] owns one index generation together with the embedding
//! provider and optional reranker, and implements the two-stage search:
//! over-fetch a recall set by vector distance, then let the reranker pick
//! the final results.
//!
//! # Example
//!
//! ```rust,ignore
//! use kbqa_retrieval::{RetrievalConfig, Retriever, join_context};
//!
//! let mut retriever = Retriever::from_config(RetrievalConfig::default())?;
//! let status = retriever.build_index(chunks, false).await;
//! let passages = retriever.retrieve("how do refunds work?").await;
//! let context = join_context(&passages);
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::RetrievalConfig;
use crate::document::{DocumentChunk, ScoredCandidate};
use crate::embedding::{Embedding, EmbeddingProvider, create_embedding_provider};
use crate::error::{RagError, Result};
use crate::index::{DimensionCorrection, SimilarityIndex, SourceDigest, source_digest};
use crate::reranker::{Reranker, load_reranker};

/// Separator placed between passages by [`join_context`].
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Join retrieved passages into one context string for answer generation.
pub fn join_context(passages: &[String]) -> String {
    passages.join(CONTEXT_SEPARATOR)
}

/// Outcome of [`Retriever::build_index`].
#[derive(Debug, Clone, PartialEq)]
pub enum IndexStatus {
    /// A persisted index built from the same documents was loaded.
    Loaded {
        /// Number of indexed chunks.
        chunks: usize,
        /// Vector width.
        dimension: usize,
    },
    /// A new index was embedded and built.
    Built {
        /// Number of indexed chunks.
        chunks: usize,
        /// Vector width.
        dimension: usize,
        /// Set when the configured dimension was overridden.
        correction: Option<DimensionCorrection>,
        /// Whether the index was written to disk.
        persisted: bool,
    },
    /// No index is available; retrieval returns empty results.
    Unavailable {
        /// Why no index could be prepared.
        reason: String,
    },
}

impl IndexStatus {
    /// Whether retrieval can return results.
    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }
}

/// The retrieval engine.
///
/// `build_index` needs `&mut self` and `retrieve` needs `&self`, so one
/// instance can never rebuild while a retrieval is in flight.
pub struct Retriever {
    config: RetrievalConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    index: Option<SimilarityIndex>,
}

impl Retriever {
    /// Create a new [`RetrieverBuilder`].
    pub fn builder() -> RetrieverBuilder {
        RetrieverBuilder::default()
    }

    /// Create a retriever whose components are chosen by `config`.
    ///
    /// The embedding backend and reranker are probed here; a reranker that
    /// fails to load is left out rather than failing construction.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `config` is invalid or no
    /// embedding backend can be constructed.
    pub fn from_config(config: RetrievalConfig) -> Result<Self> {
        config.validate()?;
        let embedding_provider = create_embedding_provider(&config)?;
        let reranker = load_reranker(&config);
        Ok(Self { config, embedding_provider, reranker, index: None })
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Whether a reranker is active.
    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// The current index generation, if one is ready.
    pub fn index(&self) -> Option<&SimilarityIndex> {
        self.index.as_ref()
    }

    /// Whether retrieval can return results.
    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    /// Prepare the index for `documents`.
    ///
    /// Unless `force_reindex` is set, a persisted index is reused when it
    /// was built from exactly this document sequence (same chunks, same
    /// order) by the same embedder (provider, model and declared width).
    /// A missing, unreadable or stale file triggers a rebuild:
    /// embed every chunk, build, persist.
    ///
    /// The previous generation is discarded first, so after a failed call
    /// the retriever returns empty results. Failures are reported through
    /// [`IndexStatus::Unavailable`], never as errors.
    pub async fn build_index(
        &mut self,
        documents: Vec<DocumentChunk>,
        force_reindex: bool,
    ) -> IndexStatus {
        self.index = None;

        if documents.is_empty() {
            warn!("no documents to index, retrieval will return nothing");
            return IndexStatus::Unavailable { reason: "no documents to index".into() };
        }

        let digest = source_digest(&self.embedder_identity(), &documents);
        let path = self.config.index_path.clone();

        if !force_reindex && path.exists() {
            if let Some(index) = load_matching(&path, &digest) {
                let status =
                    IndexStatus::Loaded { chunks: index.len(), dimension: index.dimension() };
                info!(path = %path.display(), chunks = index.len(), "reusing persisted index");
                self.index = Some(index);
                return status;
            }
        }

        match self.embed_and_build(documents, digest).await {
            Ok(index) => {
                let persisted = match index.persist(&path) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(error = %e, "failed to save index, keeping it in memory only");
                        false
                    }
                };
                let status = IndexStatus::Built {
                    chunks: index.len(),
                    dimension: index.dimension(),
                    correction: index.correction(),
                    persisted,
                };
                self.index = Some(index);
                status
            }
            Err(e) => {
                error!(error = %e, "index not built");
                IndexStatus::Unavailable { reason: e.to_string() }
            }
        }
    }

    /// Provider name, active model and declared width of the embedder.
    fn embedder_identity(&self) -> String {
        let provider = self.embedding_provider.name();
        let model = match provider {
            "ollama" => self.config.remote_embedding_model.as_str(),
            "fastembed" => self.config.local_embedding_model.as_str(),
            _ => "",
        };
        format!("{provider}/{model}/{}", self.embedding_provider.dimensions())
    }

    async fn embed_and_build(
        &self,
        documents: Vec<DocumentChunk>,
        digest: SourceDigest,
    ) -> Result<SimilarityIndex> {
        info!(chunks = documents.len(), provider = self.embedding_provider.name(), "embedding chunks");
        let embeddings = {
            let texts: Vec<&str> = documents.iter().map(|c| c.text.as_str()).collect();
            self.embedding_provider.embed_batch(&texts).await?
        };
        if embeddings.is_empty() {
            return Err(RagError::IndexError("embedding produced no vectors".into()));
        }

        let (vectors, chunks) = align(documents, embeddings);
        SimilarityIndex::build(vectors, chunks, self.config.dimension())
            .map(|index| index.with_source_digest(digest))
    }

    /// Retrieve the best passages for `query`, best first.
    ///
    /// Returns an empty list for a blank query, when no index is ready, or
    /// when the query cannot be embedded or searched.
    pub async fn retrieve(&self, query: &str) -> Vec<String> {
        self.retrieve_scored(query).await.into_iter().map(|c| c.chunk.text).collect()
    }

    /// Like [`retrieve`](Self::retrieve) but keeps distances and scores.
    ///
    /// With a reranker, the recall set of `initial_top_k` candidates is
    /// scored, stably sorted by descending score (equal scores keep distance
    /// order) and cut to `rerank_top_k`. If scoring fails the candidates
    /// stay in distance order. Without a reranker, the `top_k` nearest
    /// candidates are returned in distance order.
    pub async fn retrieve_scored(&self, query: &str) -> Vec<ScoredCandidate> {
        let query = query.trim();
        if query.is_empty() {
            warn!("empty query");
            return Vec::new();
        }
        let Some(index) = &self.index else {
            warn!("no index has been built or loaded");
            return Vec::new();
        };

        let query_vector = match self.embedding_provider.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                error!(error = %e, "query embedding failed");
                return Vec::new();
            }
        };

        let k = if self.reranker.is_some() { self.config.initial_top_k } else { self.config.top_k };
        debug!(k, "vector search");
        let neighbors = match index.search(&query_vector, k) {
            Ok(neighbors) => neighbors,
            Err(e) => {
                error!(error = %e, "vector search failed");
                return Vec::new();
            }
        };

        let mut candidates: Vec<ScoredCandidate> = neighbors
            .into_iter()
            .enumerate()
            .filter_map(|(distance_rank, n)| {
                index.chunk(n.position).map(|chunk| ScoredCandidate {
                    chunk: chunk.clone(),
                    distance: n.distance,
                    distance_rank,
                    rerank_score: None,
                })
            })
            .collect();

        let Some(reranker) = &self.reranker else {
            info!(result_count = candidates.len(), "retrieval completed");
            return candidates;
        };
        if candidates.is_empty() {
            return candidates;
        }

        debug!(reranker = reranker.name(), candidates = candidates.len(), "reranking");
        let scores = {
            let documents: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
            reranker.score(query, &documents).await
        };
        match scores {
            Ok(scores) if scores.len() == candidates.len() => {
                for (candidate, score) in candidates.iter_mut().zip(scores) {
                    candidate.rerank_score = Some(score);
                }
                candidates.sort_by(|a, b| rank_key(b).total_cmp(&rank_key(a)));
            }
            Ok(scores) => warn!(
                expected = candidates.len(),
                received = scores.len(),
                "reranker score count mismatch, keeping distance order"
            ),
            Err(e) => warn!(error = %e, "reranking failed, keeping distance order"),
        }
        candidates.truncate(self.config.rerank_top_k);

        info!(result_count = candidates.len(), "retrieval completed");
        candidates
    }
}

fn load_matching(path: &Path, digest: &SourceDigest) -> Option<SimilarityIndex> {
    match SimilarityIndex::load(path) {
        Ok(index) if index.source_digest() == digest => Some(index),
        Ok(_) => {
            warn!(
                path = %path.display(),
                "documents or embedder changed since the index was saved, rebuilding"
            );
            None
        }
        Err(e) => {
            warn!(error = %e, "persisted index unusable, rebuilding");
            None
        }
    }
}

/// Pair every produced vector with the chunk it was computed from.
///
/// Chunks without a vector are dropped, as are vectors whose width differs
/// from the first vector's.
fn align(
    documents: Vec<DocumentChunk>,
    embeddings: Vec<Embedding>,
) -> (Vec<Vec<f32>>, Vec<DocumentChunk>) {
    let width = embeddings.first().map_or(0, |e| e.vector.len());
    let mut slots: Vec<Option<DocumentChunk>> = documents.into_iter().map(Some).collect();
    let mut vectors = Vec::with_capacity(embeddings.len());
    let mut chunks = Vec::with_capacity(embeddings.len());

    for Embedding { input_index, vector } in embeddings {
        if vector.len() != width {
            warn!(input_index, width = vector.len(), expected = width, "dropping ragged vector");
            continue;
        }
        if let Some(chunk) = slots.get_mut(input_index).and_then(Option::take) {
            vectors.push(vector);
            chunks.push(chunk);
        }
    }

    let dropped = slots.iter().filter(|s| s.is_some()).count();
    if dropped > 0 {
        warn!(dropped, "chunks without a usable vector were left out of the index");
    }
    (vectors, chunks)
}

fn rank_key(candidate: &ScoredCandidate) -> f32 {
    candidate.rerank_score.filter(|s| !s.is_nan()).unwrap_or(f32::NEG_INFINITY)
}

/// Builder for constructing a [`Retriever`] from explicit components.
///
/// A reranker is ignored when the configuration disables reranking.
///
/// # Example
///
/// ```rust,ignore
/// let retriever = Retriever::builder()
///     .config(config)
///     .embedding_provider(Arc::new(embedder))
///     .reranker(Arc::new(reranker))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RetrieverBuilder {
    config: Option<RetrievalConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RetrieverBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set a reranker for the second retrieval stage.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Build the [`Retriever`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the configuration or embedding
    /// provider is missing or the configuration is invalid.
    pub fn build(self) -> Result<Retriever> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let reranker = if config.use_reranker { self.reranker } else { None };

        Ok(Retriever { config, embedding_provider, reranker, index: None })
    }
}
