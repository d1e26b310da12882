// src/extract.rs

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::llm::ModelClient;
use crate::prompt::PromptPayload;

/// Characters of raw model output kept for diagnostics.
const RAW_RESPONSE_PREVIEW: usize = 500;

/// Field name → extracted value, in the order the model emitted them.
pub type ExtractedFields = Map<String, Value>;

/// Outcome of one extraction attempt: either a parsed object or a
/// human-readable failure, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Fields(ExtractedFields),
    Failed {
        message: String,
        raw_response: Option<String>,
    },
}

impl ExtractionResult {
    fn failed(message: impl Into<String>) -> Self {
        ExtractionResult::Failed {
            message: message.into(),
            raw_response: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Fields(_))
    }
}

/// Send one prompt to the model and recover a JSON object from its reply.
///
/// Transport and API failures are folded into `ExtractionResult::Failed`.
pub async fn extract(
    client: &dyn ModelClient,
    credential: &str,
    prompt: &PromptPayload,
) -> ExtractionResult {
    match client.generate(credential, prompt).await {
        Ok(text) => {
            let result = recover_json(&text);
            info!(
                response_bytes = text.len(),
                parsed = result.is_success(),
                "Model response received"
            );
            result
        }
        Err(e) => {
            warn!(error = %e, "Model call failed");
            ExtractionResult::failed(format!("Model API error: {e}"))
        }
    }
}

/// Take the span from the first `{` to the last `}` and parse it as a
/// JSON object.
///
/// Known limitation: text holding several sibling objects, or a stray
/// brace in the surrounding prose, yields a span that is not one object
/// and is reported as a parse failure.
pub fn recover_json(response: &str) -> ExtractionResult {
    let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) else {
        return ExtractionResult::Failed {
            message: "No valid JSON found in response".to_string(),
            raw_response: Some(preview(response).to_string()),
        };
    };

    // a closing brace before the opening one leaves nothing to parse
    let candidate = if end >= start { &response[start..=end] } else { "" };

    match serde_json::from_str::<ExtractedFields>(candidate) {
        Ok(fields) => {
            info!(fields = fields.len(), "Recovered JSON object from response");
            ExtractionResult::Fields(fields)
        }
        Err(e) => ExtractionResult::Failed {
            message: format!("Failed to parse JSON response: {e}"),
            raw_response: Some(preview(response).to_string()),
        },
    }
}

fn preview(text: &str) -> &str {
    crate::document::truncate_chars(text, RAW_RESPONSE_PREVIEW)
}
