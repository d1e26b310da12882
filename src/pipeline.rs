// src/pipeline.rs

use base64::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{Instrument, info, warn};

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::document;
use crate::extract::ExtractedFields;
use crate::llm::ModelClient;
use crate::prompt::FieldSpec;
use crate::rasterize::PageRasterizer;
use crate::spreadsheet::{self, SpreadsheetError};
use crate::strategy::{DegradationController, ProcessingMode, ResolveError};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or malformed input (HTTP 400).
    #[error("{0}")]
    BadRequest(String),

    /// Model, parsing or spreadsheet failure (HTTP 500).
    #[error("{0}")]
    Processing(String),

    /// Every strategy failed; carries the last model reply preview, if any.
    #[error("{message}")]
    Extraction {
        message: String,
        raw_response: Option<String>,
    },
}

impl From<ResolveError> for PipelineError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NoReadableText => PipelineError::BadRequest(e.to_string()),
            ResolveError::Extraction {
                message,
                raw_response,
            } => PipelineError::Extraction {
                message,
                raw_response,
            },
            other => PipelineError::Processing(other.to_string()),
        }
    }
}

impl From<SpreadsheetError> for PipelineError {
    fn from(e: SpreadsheetError) -> Self {
        PipelineError::Processing(e.to_string())
    }
}

/// Field configuration as received: already structured (JSON body) or
/// still a JSON string (multipart form field).
#[derive(Debug, Clone)]
pub enum ColumnConfig {
    Value(Value),
    Json(String),
}

/// Document payload as received.
#[derive(Debug, Clone)]
pub enum DocumentPayload {
    Bytes(Vec<u8>),
    /// A multipart file part; only `.pdf` names are accepted.
    File { filename: String, bytes: Vec<u8> },
    /// Base64, optionally prefixed with `data:<mime>;base64,`.
    Base64(String),
}

/// An upload before validation. Every part may be missing.
#[derive(Debug, Clone, Default)]
pub struct RawUpload {
    pub api_key: Option<String>,
    pub column_config: Option<ColumnConfig>,
    pub document: Option<DocumentPayload>,
}

/// A validated upload: all three parts present and non-empty.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub credential: String,
    pub fields: Vec<FieldSpec>,
    pub document_bytes: Vec<u8>,
}

impl RawUpload {
    /// Check credential, then fields, then document; the first problem wins.
    pub fn validate(self) -> Result<UploadRequest, PipelineError> {
        let credential = self
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PipelineError::BadRequest("API key is required".to_string()))?;

        let fields = parse_fields(self.column_config)?;

        let document_bytes = match self.document {
            None => Vec::new(),
            Some(DocumentPayload::Bytes(b)) => b,
            Some(DocumentPayload::File { filename, bytes }) => {
                if filename.is_empty() {
                    return Err(PipelineError::BadRequest("No file selected".to_string()));
                }
                if !filename.to_ascii_lowercase().ends_with(".pdf") {
                    return Err(PipelineError::BadRequest("Invalid file type".to_string()));
                }
                bytes
            }
            Some(DocumentPayload::Base64(s)) if s.trim().is_empty() => Vec::new(),
            Some(DocumentPayload::Base64(s)) => decode_base64_document(&s)?,
        };
        if document_bytes.is_empty() {
            return Err(PipelineError::BadRequest("No file data provided".to_string()));
        }

        Ok(UploadRequest {
            credential,
            fields,
            document_bytes,
        })
    }
}

fn parse_fields(config: Option<ColumnConfig>) -> Result<Vec<FieldSpec>, PipelineError> {
    let required = || PipelineError::BadRequest("Column configuration is required".to_string());
    let invalid = |e: serde_json::Error| {
        PipelineError::BadRequest(format!("Invalid column configuration: {e}"))
    };

    let value = match config.ok_or_else(required)? {
        ColumnConfig::Json(s) if s.trim().is_empty() => return Err(required()),
        ColumnConfig::Json(s) => serde_json::from_str::<Value>(&s).map_err(invalid)?,
        // some clients send the array JSON-encoded inside the JSON body
        ColumnConfig::Value(Value::String(s)) => serde_json::from_str::<Value>(&s).map_err(invalid)?,
        ColumnConfig::Value(v) => v,
    };

    let fields: Vec<FieldSpec> = serde_json::from_value(value).map_err(invalid)?;
    if fields.is_empty() {
        return Err(required());
    }

    if let Some(i) = fields.iter().position(|f| f.name.trim().is_empty()) {
        return Err(PipelineError::BadRequest(format!(
            "Column configuration entry {i} has an empty name"
        )));
    }

    let mut seen = HashSet::new();
    for f in &fields {
        if !seen.insert(f.name.as_str()) {
            warn!(name = %f.name, "Duplicate column name in configuration");
        }
    }

    Ok(fields)
}

fn decode_base64_document(data: &str) -> Result<Vec<u8>, PipelineError> {
    let data = data.trim();
    let encoded = match data.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| PipelineError::BadRequest(format!("Invalid file data: {e}")))
}

/// Successful response body.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub message: String,
    pub extracted_data: ExtractedFields,
    pub excel_file: String,
    /// Base64-encoded workbook.
    pub excel_data: String,
    pub processing_mode: ProcessingMode,
}

/// Validates uploads and runs load → resolve → serialize.
pub struct Pipeline {
    controller: DegradationController,
    rasterizer: Option<Arc<dyn PageRasterizer>>,
    artifacts: Option<ArtifactStore>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        client: Arc<dyn ModelClient>,
        rasterizer: Option<Arc<dyn PageRasterizer>>,
        artifacts: Option<ArtifactStore>,
    ) -> Self {
        let controller = DegradationController::new(
            client,
            config.extraction.strategies.clone(),
            config.extraction.max_text_chars,
        );
        Self {
            controller,
            rasterizer,
            artifacts,
        }
    }

    pub fn artifacts(&self) -> Option<&ArtifactStore> {
        self.artifacts.as_ref()
    }

    pub async fn process(&self, raw: RawUpload) -> Result<ResponseEnvelope, PipelineError> {
        let request = raw.validate()?;
        let span = tracing::info_span!(
            "upload",
            fields = request.fields.len(),
            pdf_bytes = request.document_bytes.len()
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: UploadRequest) -> Result<ResponseEnvelope, PipelineError> {
        info!("Processing upload");

        let UploadRequest {
            credential,
            fields,
            document_bytes,
        } = request;

        // PDF parsing and page rendering block
        let rasterizer = self.rasterizer.clone();
        let reps = tokio::task::spawn_blocking(move || {
            document::load(&document_bytes, rasterizer.as_deref())
        })
        .await
        .map_err(|e| PipelineError::Processing(format!("Document processing error: {e}")))?;

        let resolved = self.controller.resolve(&credential, &fields, &reps).await?;
        drop(reps);

        let excel_bytes = spreadsheet::serialize(&resolved.fields)?;
        let mut excel_file = spreadsheet::artifact_name(OffsetDateTime::now_utc())?;

        // the store may pick a suffixed name when this second is taken
        if let Some(store) = &self.artifacts {
            excel_file = store.save(&excel_file, &excel_bytes).await.map_err(|e| {
                PipelineError::Processing(format!("Excel generation error: {e}"))
            })?;
        }

        info!(mode = %resolved.mode, file = %excel_file, "Upload processed");

        Ok(ResponseEnvelope {
            success: true,
            message: format!(
                "Invoice data extracted successfully ({} mode)",
                resolved.mode
            ),
            extracted_data: resolved.fields,
            excel_file,
            excel_data: BASE64_STANDARD.encode(&excel_bytes),
            processing_mode: resolved.mode,
        })
    }
}
