//! Answer generation through Ollama's `/api/generate` endpoint.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::GenerationConfig;
use crate::error::{CliError, Result};

/// Returned when the model answers without a `response` field.
pub const NO_ANSWER: &str = "The model did not produce an answer.";

/// Returned when the answer model cannot be reached or rejects the request.
pub const SERVICE_UNAVAILABLE: &str =
    "The answer model could not be reached. Check that the Ollama service is running.";

const INSTRUCTIONS: &str = "\
You are a careful question-answering assistant. Answer the user's question \
using the context below, in the language the question is asked in.

Rules:
1. Base the answer on the provided context.
2. If the question asks for specific wording (a quotation, a numbered \
sentence, the original text), quote the context directly.
3. Stay objective and restate only what the context supports.
";

/// Fill the prompt template with a question and its joined context.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!("{INSTRUCTIONS}\nContext:\n---\n{context}\n---\n\nQuestion: {query}\n\nAnswer:\n")
}

/// Generates answers with a non-streaming Ollama completion call.
pub struct AnswerGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

impl AnswerGenerator {
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CliError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Name of the completion model answers are requested from.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answer `query` from `context`.
    ///
    /// Never fails: a missing `response` field yields [`NO_ANSWER`] and any
    /// transport or HTTP status error yields [`SERVICE_UNAVAILABLE`].
    pub async fn generate(&self, query: &str, context: &str) -> String {
        let prompt = build_prompt(query, context);
        info!(model = %self.model, prompt_len = prompt.len(), "generating answer");

        let request = GenerateRequest { model: &self.model, prompt: &prompt, stream: false };
        let url = format!("{}/api/generate", self.base_url);
        let response = match self.client.post(url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "generate request failed");
                return SERVICE_UNAVAILABLE.to_string();
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!(%status, "generate API error");
            return SERVICE_UNAVAILABLE.to_string();
        }

        match response.json::<GenerateResponse>().await {
            Ok(GenerateResponse { response: Some(answer) }) => {
                info!(answer_len = answer.len(), "answer generated");
                answer
            }
            Ok(GenerateResponse { response: None }) => {
                warn!("generate response carried no answer");
                NO_ANSWER.to_string()
            }
            Err(e) => {
                error!(error = %e, "failed to read generate response");
                SERVICE_UNAVAILABLE.to_string()
            }
        }
    }
}
