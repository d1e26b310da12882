// src/llm/gemini.rs

use async_trait::async_trait;
use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ModelClient, ModelError, status_error};
use crate::prompt::PromptPayload;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Google Gemini `generateContent` over REST. Accepts PDF and image
/// attachments natively as inline data.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(http: Client, base_url: &str, model: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn request_body(prompt: &PromptPayload) -> GenerateRequest {
        let mut parts = vec![Part {
            text: Some(prompt.text.clone()),
            inline_data: None,
        }];
        if let Some(att) = &prompt.attachment {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: att.mime_type.clone(),
                    data: BASE64_STANDARD.encode(&att.data),
                }),
            });
        }

        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig { temperature: 0.0 },
        }
    }

    fn response_text(response: GenerateResponse) -> Result<String, ModelError> {
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, credential: &str, prompt: &PromptPayload) -> Result<String, ModelError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = Self::request_body(prompt);

        info!(
            model = %self.model,
            prompt_bytes = prompt.text.len(),
            attachment = ?prompt.attachment.as_ref().map(|a| a.mime_type.as_str()),
            "Calling Gemini"
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", credential)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = Self::response_text(parsed)?;
        debug!(response_bytes = text.len(), "Gemini response received");
        Ok(text)
    }
}
