//! Retrieval engine for knowledge-base question answering.
//!
//! Chunks are embedded into vectors, stored in an exhaustive L2
//! [`SimilarityIndex`] that persists to a single file, and searched in two
//! stages: a cheap vector search fetches a recall set, then an optional
//! cross-encoder [`Reranker`] picks the final passages.
//!
//! # Features
//!
//! - `local`: in-process embedding and cross-encoder reranking through
//!   fastembed. Without it the local backend falls back to remote
//!   embeddings and reranking is unavailable.
//!
//! # Example
//!
//! ```rust,ignore
//! use kbqa_retrieval::{DocumentChunk, RetrievalConfig, Retriever};
//!
//! let config = RetrievalConfig::builder().index_path("vector_db/index.bin").build()?;
//! let mut retriever = Retriever::from_config(config)?;
//!
//! let chunks = vec![DocumentChunk::with_source("Refunds take 5 days.", "faq.txt")];
//! retriever.build_index(chunks, false).await;
//! let passages = retriever.retrieve("how long do refunds take?").await;
//! ```

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ollama;
pub mod reranker;
pub mod retriever;

#[cfg(feature = "local")]
pub mod local;

pub use config::{EmbeddingBackend, RetrievalConfig, RetrievalConfigBuilder};
pub use document::{DocumentChunk, SOURCE_KEY, ScoredCandidate};
pub use embedding::{Embedding, EmbeddingProvider, create_embedding_provider};
pub use error::{RagError, Result};
pub use index::{DimensionCorrection, Neighbor, SimilarityIndex, SourceDigest, source_digest};
pub use ollama::OllamaEmbeddingProvider;
pub use reranker::{Reranker, load_reranker};
pub use retriever::{
    CONTEXT_SEPARATOR, IndexStatus, Retriever, RetrieverBuilder, join_context,
};

#[cfg(feature = "local")]
pub use local::{CrossEncoderReranker, FastEmbedProvider};
