//! Reranker trait for re-scoring retrieval candidates.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::RetrievalConfig;
use crate::error::Result;

/// A second-stage scorer for a small candidate set.
///
/// Implementations score each document jointly with the query (typically
/// a cross-encoder), which is more precise than vector distance and much
/// more expensive per pair.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Score every document against `query`.
    ///
    /// Returns one score per document in input order. Higher is more
    /// relevant.
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

/// Load the reranker requested by `config`.
///
/// Returns `None` when reranking is disabled or the model cannot be
/// loaded; retrieval then ranks by vector distance alone.
pub fn load_reranker(config: &RetrievalConfig) -> Option<Arc<dyn Reranker>> {
    if !config.use_reranker {
        info!("reranking disabled");
        return None;
    }
    let reranker = load_cross_encoder(&config.reranker_model);
    if reranker.is_none() {
        warn!(model = %config.reranker_model, "reranker unavailable, ranking by distance only");
    }
    reranker
}

#[cfg(feature = "local")]
fn load_cross_encoder(model: &str) -> Option<Arc<dyn Reranker>> {
    match crate::local::CrossEncoderReranker::load(model) {
        Ok(reranker) => Some(Arc::new(reranker)),
        Err(e) => {
            warn!(error = %e, "failed to load reranker model");
            None
        }
    }
}

#[cfg(not(feature = "local"))]
fn load_cross_encoder(_model: &str) -> Option<Arc<dyn Reranker>> {
    warn!("built without the `local` feature");
    None
}
