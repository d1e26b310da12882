// src/strategy.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, info, warn};

use crate::document::{self, DocumentRepresentation};
use crate::extract::{self, ExtractedFields, ExtractionResult};
use crate::llm::ModelClient;
use crate::prompt::{self, FieldSpec};

/// The strategy that produced a successful extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Original PDF attached for the model to read natively.
    NativePdf,
    /// Rendered page image attached alongside the extracted text.
    Multimodal,
    /// Extracted text only, no attachment.
    TextOnly,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::NativePdf => "native_pdf",
            ProcessingMode::Multimodal => "multimodal",
            ProcessingMode::TextOnly => "text_only",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub fields: ExtractedFields,
    pub mode: ProcessingMode,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Only text was usable and there was none. Nothing was sent to the model.
    #[error("Could not extract text from PDF. Please ensure the PDF contains readable text.")]
    NoReadableText,

    #[error("No extraction strategy is available for this document")]
    NoStrategy,

    /// Every attempted strategy failed; carries the last failure.
    #[error("{message}")]
    Extraction {
        message: String,
        raw_response: Option<String>,
    },
}

/// Tries each configured strategy in order, at most once each, and stops
/// at the first one that yields a parsed object.
pub struct DegradationController {
    client: Arc<dyn ModelClient>,
    strategies: Vec<ProcessingMode>,
    max_text_chars: usize,
}

impl DegradationController {
    /// Repeated modes are dropped, keeping the first occurrence.
    pub fn new(
        client: Arc<dyn ModelClient>,
        mut strategies: Vec<ProcessingMode>,
        max_text_chars: usize,
    ) -> Self {
        let mut seen = HashSet::new();
        strategies.retain(|mode| seen.insert(*mode));
        Self {
            client,
            strategies,
            max_text_chars,
        }
    }

    pub async fn resolve(
        &self,
        credential: &str,
        fields: &[FieldSpec],
        reps: &[DocumentRepresentation],
    ) -> Result<Resolved, ResolveError> {
        let text = document::truncate_chars(document::extracted_text(reps), self.max_text_chars);
        let mut last_failure: Option<(String, Option<String>)> = None;

        for &mode in &self.strategies {
            let representation = match mode {
                ProcessingMode::NativePdf => reps
                    .iter()
                    .find(|r| matches!(r, DocumentRepresentation::RawBinary { .. }))
                    .cloned(),
                ProcessingMode::Multimodal => reps
                    .iter()
                    .find(|r| matches!(r, DocumentRepresentation::Image { .. }))
                    .cloned(),
                ProcessingMode::TextOnly => {
                    if text.trim().is_empty() {
                        if last_failure.is_none() {
                            warn!("No readable text and no other strategy attempted");
                            return Err(ResolveError::NoReadableText);
                        }
                        warn!("No readable text; skipping text-only fallback");
                        None
                    } else {
                        Some(DocumentRepresentation::Text(text.to_string()))
                    }
                }
            };

            let Some(representation) = representation else {
                info!(%mode, "Strategy unavailable for this document, skipping");
                continue;
            };

            let payload = prompt::build(fields, &representation, text);
            let result = extract::extract(self.client.as_ref(), credential, &payload)
                .instrument(tracing::info_span!("strategy", %mode))
                .await;

            match result {
                ExtractionResult::Fields(fields) => {
                    info!(%mode, fields = fields.len(), "Extraction succeeded");
                    return Ok(Resolved { fields, mode });
                }
                ExtractionResult::Failed {
                    message,
                    raw_response,
                } => {
                    warn!(
                        %mode,
                        error = %message,
                        raw_response = raw_response.as_deref().unwrap_or(""),
                        "Strategy failed, falling through"
                    );
                    last_failure = Some((message, raw_response));
                }
            }
        }

        match last_failure {
            Some((message, raw_response)) => Err(ResolveError::Extraction {
                message,
                raw_response,
            }),
            None => Err(ResolveError::NoStrategy),
        }
    }
}
