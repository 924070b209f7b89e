//! Question-answering pipeline: load → index → retrieve → generate.

use kbqa_retrieval::{IndexStatus, Retriever, join_context};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::Result;
use crate::generator::AnswerGenerator;
use crate::processor::DocumentProcessor;

/// Returned when retrieval finds nothing to answer from.
pub const NO_CONTEXT: &str =
    "No relevant information was found in the knowledge base to answer this question.";

/// Ties document processing, retrieval and answer generation together.
///
/// # Example
///
/// ```rust,ignore
/// use kbqa_cli::{AppConfig, QaPipeline};
///
/// let mut pipeline = QaPipeline::from_config(&AppConfig::load(None)?)?;
/// pipeline.setup(false).await;
/// println!("{}", pipeline.ask("What is the refund window?").await);
/// ```
pub struct QaPipeline {
    processor: DocumentProcessor,
    retriever: Retriever,
    generator: AnswerGenerator,
    file_paths: Vec<std::path::PathBuf>,
}

impl QaPipeline {
    /// Build the pipeline from configuration, probing embedding and
    /// reranking backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the retrieval or generation settings are invalid.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let retriever = Retriever::from_config(config.retrieval.clone())?;
        Ok(Self::new(config, retriever, AnswerGenerator::new(&config.generation)?))
    }

    /// Assemble a pipeline around an already constructed retriever.
    pub fn new(config: &AppConfig, retriever: Retriever, generator: AnswerGenerator) -> Self {
        Self {
            processor: DocumentProcessor::from_config(&config.documents),
            retriever,
            generator,
            file_paths: config.documents.file_paths.clone(),
        }
    }

    /// The retrieval engine, for inspecting the index after [`setup`](Self::setup).
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Load and split the configured documents, then load or build the index.
    pub async fn setup(&mut self, force_reindex: bool) -> IndexStatus {
        let chunks = self.processor.load_and_split(&self.file_paths);
        if chunks.is_empty() {
            warn!(files = self.file_paths.len(), "no document chunks were produced");
        }
        let status = self.retriever.build_index(chunks, force_reindex).await;
        info!(?status, "index prepared");
        status
    }

    /// Answer one question.
    ///
    /// Returns [`NO_CONTEXT`] without calling the answer model when
    /// retrieval comes back empty.
    pub async fn ask(&self, query: &str) -> String {
        info!(query, "question received");
        let passages = self.retriever.retrieve(query).await;
        if passages.is_empty() {
            return NO_CONTEXT.to_string();
        }
        debug!(passages = passages.len(), model = self.generator.model(), "generating answer");
        self.generator.generate(query, &join_context(&passages)).await
    }
}
