//! Deterministic test doubles for the embedding provider and reranker.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kbqa_retrieval::{DocumentChunk, RagError, Reranker, Result, RetrievalConfig};

pub const DIM: usize = 4096;

/// Embeds text as a normalized bag of character trigrams.
///
/// Words shorter than three characters count as one gram, so "cat" and
/// "cats" share the `cat` gram while "dog" shares nothing with "cat".
pub struct TrigramEmbedder {
    calls: Arc<AtomicUsize>,
    refuse: Option<String>,
}

impl TrigramEmbedder {
    pub fn new() -> Self {
        Self { calls: Arc::new(AtomicUsize::new(0)), refuse: None }
    }

    /// Fail every request for exactly this text.
    pub fn refusing(text: &str) -> Self {
        Self { refuse: Some(text.to_string()), ..Self::new() }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

fn bucket(gram: &str) -> usize {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in gram.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x100000001b3);
    }
    (h % DIM as u64) as usize
}

pub fn trigram_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
    {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() < 3 {
            v[bucket(word)] += 1.0;
            continue;
        }
        for window in chars.windows(3) {
            let gram: String = window.iter().collect();
            v[bucket(&gram)] += 1.0;
        }
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl kbqa_retrieval::EmbeddingProvider for TrigramEmbedder {
    fn name(&self) -> &str {
        "trigram"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse.as_deref() == Some(text) {
            return Err(RagError::EmbeddingError {
                provider: "trigram".into(),
                message: "refused".into(),
            });
        }
        Ok(trigram_vector(text))
    }
}

/// Returns constant vectors of a fixed width.
pub struct FixedWidthEmbedder(pub usize);

#[async_trait]
impl kbqa_retrieval::EmbeddingProvider for FixedWidthEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        self.0
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vec![text.len() as f32; self.0])
    }
}

/// Fails every text.
pub struct DownEmbedder;

#[async_trait]
impl kbqa_retrieval::EmbeddingProvider for DownEmbedder {
    fn name(&self) -> &str {
        "down"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError { provider: "down".into(), message: "unreachable".into() })
    }
}

/// Scores documents from a fixed table; unknown documents score zero.
pub struct TableReranker(pub HashMap<String, f32>);

impl TableReranker {
    pub fn new(entries: &[(&str, f32)]) -> Self {
        Self(entries.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }
}

#[async_trait]
impl Reranker for TableReranker {
    fn name(&self) -> &str {
        "table"
    }

    async fn score(&self, _query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        Ok(documents.iter().map(|d| self.0.get(*d).copied().unwrap_or(0.0)).collect())
    }
}

/// Always fails to score.
pub struct BrokenReranker;

#[async_trait]
impl Reranker for BrokenReranker {
    fn name(&self) -> &str {
        "broken"
    }

    async fn score(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>> {
        Err(RagError::RerankerError { reranker: "broken".into(), message: "model crashed".into() })
    }
}

pub fn chunks(texts: &[&str]) -> Vec<DocumentChunk> {
    texts.iter().map(|t| DocumentChunk::with_source(*t, "corpus.txt")).collect()
}

pub fn config(dir: &Path, use_reranker: bool) -> RetrievalConfig {
    RetrievalConfig::builder()
        .index_path(dir.join("vector_db").join("index.bin"))
        .embedding_dimension(DIM)
        .use_reranker(use_reranker)
        .build()
        .unwrap()
}
