//! Interactive knowledge-base question answering.
//!
//! Loads text files, splits them into chunks, indexes them with
//! [`kbqa_retrieval`] and answers questions through an Ollama completion
//! model grounded on the retrieved passages.

pub mod config;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod processor;

pub use config::{AppConfig, DocumentsConfig, GenerationConfig};
pub use error::{CliError, Result};
pub use generator::{AnswerGenerator, NO_ANSWER, SERVICE_UNAVAILABLE, build_prompt};
pub use pipeline::{NO_CONTEXT, QaPipeline};
pub use processor::{CHUNK_INDEX_KEY, DocumentProcessor};
