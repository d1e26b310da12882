// src/llm/openai.rs

use async_trait::async_trait;
use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ModelClient, ModelError, status_error};
use crate::prompt::{Attachment, PromptPayload};

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileData },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(http: Client, base_url: &str, model: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn attachment_part(att: &Attachment) -> Result<ContentPart, ModelError> {
        let data_uri = format!(
            "data:{};base64,{}",
            att.mime_type,
            BASE64_STANDARD.encode(&att.data)
        );
        if att.mime_type.starts_with("image/") {
            Ok(ContentPart::ImageUrl {
                image_url: ImageUrl { url: data_uri },
            })
        } else if att.mime_type == "application/pdf" {
            Ok(ContentPart::File {
                file: FileData {
                    filename: "invoice.pdf".to_string(),
                    file_data: data_uri,
                },
            })
        } else {
            Err(ModelError::UnsupportedAttachment(att.mime_type.clone()))
        }
    }

    fn request_body(&self, prompt: &PromptPayload) -> Result<ChatRequest, ModelError> {
        let mut content = vec![ContentPart::Text {
            text: prompt.text.clone(),
        }];
        if let Some(att) = &prompt.attachment {
            content.push(Self::attachment_part(att)?);
        }

        Ok(ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            temperature: 0.0,
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn generate(&self, credential: &str, prompt: &PromptPayload) -> Result<String, ModelError> {
        let request = self.request_body(prompt)?;
        let url = format!("{}/chat/completions", self.base_url);

        info!(
            model = %self.model,
            prompt_bytes = prompt.text.len(),
            attachment = ?prompt.attachment.as_ref().map(|a| a.mime_type.as_str()),
            "Calling chat completions"
        );

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {credential}"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(ModelError::EmptyResponse)?;

        debug!(response_bytes = content.len(), "Chat completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(Client::new(), "http://localhost:11434/v1/", "qwen2.5vl")
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client().base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_image_attachment_becomes_data_uri() {
        let prompt = PromptPayload {
            text: "extract".into(),
            attachment: Some(Attachment {
                mime_type: "image/png".into(),
                data: vec![1, 2, 3],
            }),
        };
        let json = serde_json::to_value(client().request_body(&prompt).unwrap()).unwrap();
        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AQID");
        assert_eq!(json["model"], "qwen2.5vl");
    }

    #[test]
    fn test_pdf_attachment_becomes_file_part() {
        let prompt = PromptPayload {
            text: "extract".into(),
            attachment: Some(Attachment {
                mime_type: "application/pdf".into(),
                data: b"%PDF".to_vec(),
            }),
        };
        let json = serde_json::to_value(client().request_body(&prompt).unwrap()).unwrap();
        let part = &json["messages"][0]["content"][1];
        assert_eq!(part["type"], "file");
        assert!(part["file"]["file_data"]
            .as_str()
            .unwrap()
            .starts_with("data:application/pdf;base64,"));
    }

    #[test]
    fn test_unknown_attachment_rejected() {
        let prompt = PromptPayload {
            text: "extract".into(),
            attachment: Some(Attachment {
                mime_type: "application/octet-stream".into(),
                data: vec![0],
            }),
        };
        assert!(matches!(
            client().request_body(&prompt),
            Err(ModelError::UnsupportedAttachment(_))
        ));
    }
}
