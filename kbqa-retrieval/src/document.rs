//! Data types for indexed chunks and scored candidates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key naming the file a chunk was read from.
pub const SOURCE_KEY: &str = "source";

/// A bounded span of source text, the unit of indexing and retrieval.
///
/// Metadata is kept in a `BTreeMap` so that its iteration order, and with
/// it the persisted byte layout and source digest, is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentChunk {
    /// The text content of the chunk.
    pub text: String,
    /// Key-value metadata describing where the chunk came from.
    pub metadata: BTreeMap<String, String>,
}

impl DocumentChunk {
    /// Create a chunk with no metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), metadata: BTreeMap::new() }
    }

    /// Create a chunk tagged with the path it was read from.
    pub fn with_source(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(text).with_metadata(SOURCE_KEY, source)
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `source` metadata entry, if present.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A candidate produced while answering one query.
///
/// Lives only for the duration of a single retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    /// The matched chunk.
    pub chunk: DocumentChunk,
    /// Squared Euclidean distance to the query vector (lower is closer).
    pub distance: f32,
    /// Position of this candidate in the vector search result.
    pub distance_rank: usize,
    /// Cross-encoder relevance score, set only when reranking ran.
    pub rerank_score: Option<f32>,
}
