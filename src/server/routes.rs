use axum::Json;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;

use super::AppState;
use super::error::ApiError;
use crate::pipeline::{ColumnConfig, DocumentPayload, RawUpload, ResponseEnvelope};
use crate::spreadsheet::XLSX_CONTENT_TYPE;

/// JSON upload body. `column_config` may be an array or a JSON string.
#[derive(Debug, Deserialize)]
struct UploadBody {
    api_key: Option<String>,
    column_config: Option<Value>,
    file_data: Option<String>,
}

impl From<UploadBody> for RawUpload {
    fn from(body: UploadBody) -> Self {
        RawUpload {
            api_key: body.api_key,
            column_config: body.column_config.map(ColumnConfig::Value),
            document: body.file_data.map(DocumentPayload::Base64),
        }
    }
}

/// POST /upload and /api/upload
pub async fn upload(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let raw = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::rejection(e.status(), e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let Json(body) = Json::<UploadBody>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::rejection(e.status(), e.body_text()))?;
        body.into()
    };

    let envelope = state.pipeline.process(raw).await?;
    Ok(Json(envelope))
}

async fn read_multipart(mut multipart: Multipart) -> Result<RawUpload, ApiError> {
    let mut raw = RawUpload::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("api_key") => raw.api_key = Some(field.text().await?),
            Some("column_config") => {
                raw.column_config = Some(ColumnConfig::Json(field.text().await?));
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?.to_vec();
                raw.document = Some(DocumentPayload::File { filename, bytes });
            }
            other => tracing::debug!(field = ?other, "Ignoring unknown form field"),
        }
    }

    Ok(raw)
}

/// GET /download/{filename}
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let store = state
        .pipeline
        .artifacts()
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;
    let bytes = store.load(&filename).await?;

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}
