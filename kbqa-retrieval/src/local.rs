//! In-process models backed by fastembed (ONNX runtime).
//!
//! This module is only available when the `local` feature is enabled. It
//! provides the local embedding backend and the cross-encoder reranker.
//! Inference is CPU-bound and runs on tokio's blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, RerankInitOptions, RerankerModel, TextEmbedding, TextRerank,
};
use tracing::{debug, info};

use crate::embedding::{Embedding, EmbeddingProvider, is_blank, log_shortfall};
use crate::error::{RagError, Result};
use crate::reranker::Reranker;

fn embedding_model(name: &str) -> Option<EmbeddingModel> {
    let model = match name {
        "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "sentence-transformers/all-MiniLM-L12-v2" | "all-MiniLM-L12-v2" => {
            EmbeddingModel::AllMiniLML12V2
        }
        "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "BAAI/bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        "intfloat/multilingual-e5-small" => EmbeddingModel::MultilingualE5Small,
        _ => return None,
    };
    Some(model)
}

fn reranker_model(name: &str) -> Option<RerankerModel> {
    let model = match name {
        "BAAI/bge-reranker-base" => RerankerModel::BGERerankerBase,
        "BAAI/bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
        "jinaai/jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
        _ => return None,
    };
    Some(model)
}

/// An [`EmbeddingProvider`] running a sentence-embedding model in process.
///
/// The whole batch is encoded in one model call.
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Load (downloading on first use) the named model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the name is not a supported
    /// model or the model fails to initialise.
    pub fn load(model_name: &str, dimensions: usize) -> Result<Self> {
        let model = embedding_model(model_name)
            .ok_or_else(|| Self::failure(format!("unsupported local model '{model_name}'")))?;

        let model = TextEmbedding::try_new(InitOptions::new(model))
            .map_err(|e| Self::failure(format!("failed to load '{model_name}': {e}")))?;

        info!(model = model_name, dimensions, "local embedding model loaded");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    fn failure(message: String) -> RagError {
        RagError::EmbeddingError { provider: "fastembed".into(), message }
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn name(&self) -> &str {
        "fastembed"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .map(|e| e.vector)
            .ok_or_else(|| Self::failure("no embedding produced".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let (positions, inputs): (Vec<usize>, Vec<String>) = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !is_blank(text))
            .map(|(i, text)| (i, text.to_string()))
            .unzip();
        if inputs.is_empty() {
            log_shortfall(self.name(), texts.len(), 0);
            return Ok(Vec::new());
        }

        debug!(model = %self.model_name, batch_size = inputs.len(), "encoding batch");
        let model = Arc::clone(&self.model);
        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| Self::failure("model lock poisoned".into()))?;
            model.embed(inputs, None).map_err(|e| Self::failure(format!("encode failed: {e}")))
        })
        .await
        .map_err(|e| Self::failure(format!("encode task failed: {e}")))??;

        if vectors.len() != positions.len() {
            return Err(Self::failure(format!(
                "model returned {} vectors for {} texts",
                vectors.len(),
                positions.len()
            )));
        }

        let embeddings: Vec<Embedding> = positions
            .into_iter()
            .zip(vectors)
            .map(|(input_index, vector)| Embedding { input_index, vector })
            .collect();
        log_shortfall(self.name(), texts.len(), embeddings.len());
        Ok(embeddings)
    }
}

/// A [`Reranker`] scoring (query, document) pairs with a cross-encoder.
pub struct CrossEncoderReranker {
    model: Arc<Mutex<TextRerank>>,
    model_name: String,
}

impl CrossEncoderReranker {
    /// Load (downloading on first use) the named cross-encoder.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::RerankerError`] if the name is not a supported
    /// model or the model fails to initialise.
    pub fn load(model_name: &str) -> Result<Self> {
        let model = reranker_model(model_name)
            .ok_or_else(|| Self::failure(format!("unsupported reranker model '{model_name}'")))?;

        let model = TextRerank::try_new(RerankInitOptions::new(model))
            .map_err(|e| Self::failure(format!("failed to load '{model_name}': {e}")))?;

        info!(model = model_name, "reranker model loaded");
        Ok(Self { model: Arc::new(Mutex::new(model)), model_name: model_name.to_string() })
    }

    fn failure(message: String) -> RagError {
        RagError::RerankerError { reranker: "cross-encoder".into(), message }
    }
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let query = query.to_string();
        let documents: Vec<String> = documents.iter().map(|d| d.to_string()).collect();
        let count = documents.len();
        let model = Arc::clone(&self.model);

        let ranked = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| Self::failure("model lock poisoned".into()))?;
            let documents: Vec<&str> = documents.iter().map(String::as_str).collect();
            model
                .rerank(query.as_str(), documents, false, None)
                .map_err(|e| Self::failure(format!("scoring failed: {e}")))
        })
        .await
        .map_err(|e| Self::failure(format!("scoring task failed: {e}")))??;

        // fastembed returns results sorted by score; put them back in input order.
        let mut scores = vec![None; count];
        for result in ranked {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = Some(result.score);
            }
        }
        scores
            .into_iter()
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| Self::failure("model did not score every candidate".into()))
    }
}
