// src/llm/mod.rs

mod gemini;
mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::{LlmBackend, LlmSection};
use crate::prompt::PromptPayload;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("empty response from model")]
    EmptyResponse,

    #[error("attachment type {0} is not supported by this backend")]
    UnsupportedAttachment(String),
}

/// The external language model: prompt (plus optional attachment) in,
/// free-form text out.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, credential: &str, prompt: &PromptPayload) -> Result<String, ModelError>;
}

/// Build the configured backend. The HTTP client carries the request
/// timeout, so a hung call surfaces as a transport error.
pub fn build_client(llm: &LlmSection) -> Result<Arc<dyn ModelClient>, ModelError> {
    let http = Client::builder()
        .timeout(Duration::from_secs(llm.timeout_secs))
        .build()?;

    let endpoint = llm.endpoint();
    info!(
        backend = ?llm.backend,
        url = %endpoint.base_url,
        model = %endpoint.model,
        timeout_secs = llm.timeout_secs,
        "Model backend configured"
    );

    Ok(match llm.backend {
        LlmBackend::Gemini => Arc::new(GeminiClient::new(
            http,
            &endpoint.base_url,
            &endpoint.model,
        )),
        LlmBackend::OpenAi => Arc::new(OpenAiClient::new(
            http,
            &endpoint.base_url,
            &endpoint.model,
        )),
    })
}

/// Read a non-2xx response into a `ModelError::Status`.
async fn status_error(response: reqwest::Response) -> ModelError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ModelError::Status { status, body }
}
