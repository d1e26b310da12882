// src/prompt.rs

use serde::{Deserialize, Serialize};

use crate::document::DocumentRepresentation;

/// One caller-defined output column: the key the model must use and a
/// natural-language hint for finding the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A binary payload sent alongside the prompt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Everything the model needs for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub text: String,
    pub attachment: Option<Attachment>,
}

const PREAMBLE: &str = "You are an expert at extracting data from invoices.";

const RESPONSE_RULES: &str = r#"Please return the data in JSON format with the exact column names provided above. If any information is not found, use null for that field.

Example format:
{
    "column_name_1": "extracted_value_1",
    "column_name_2": "extracted_value_2"
}"#;

/// Render field specs as `- name: description` lines.
pub fn field_list(fields: &[FieldSpec]) -> String {
    fields
        .iter()
        .map(|f| format!("- {}: {}", f.name, f.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the prompt for one representation.
///
/// `text` is the best-effort extracted page text; it is embedded for the
/// image and text representations and ignored for raw binary, where the
/// model reads the document itself.
pub fn build(
    fields: &[FieldSpec],
    representation: &DocumentRepresentation,
    text: &str,
) -> PromptPayload {
    let fields_text = field_list(fields);

    match representation {
        DocumentRepresentation::RawBinary { data, mime_type } => PromptPayload {
            text: format!(
                "{PREAMBLE} Please analyze the provided PDF invoice and extract the following information:\n\n\
                 {fields_text}\n\n\
                 {RESPONSE_RULES}\n\n\
                 Please analyze the PDF document thoroughly, including any visual elements, tables, and formatting that might contain relevant information.\n\n\
                 Extract the data now:"
            ),
            attachment: Some(Attachment {
                mime_type: mime_type.clone(),
                data: data.clone(),
            }),
        },
        DocumentRepresentation::Image { data, format } => {
            let text_block = if text.trim().is_empty() {
                String::new()
            } else {
                format!("Text extracted from PDF:\n{text}\n\n")
            };
            PromptPayload {
                text: format!(
                    "{PREAMBLE} Please analyze the provided invoice (both text and image versions) and extract the following information:\n\n\
                     {fields_text}\n\n\
                     {RESPONSE_RULES}\n\n\
                     {text_block}\
                     Please also analyze the image for any additional information that might not be captured in the text.\n\
                     Extract the data now:"
                ),
                attachment: Some(Attachment {
                    mime_type: format.mime_type().to_string(),
                    data: data.clone(),
                }),
            }
        }
        DocumentRepresentation::Text(body) => PromptPayload {
            text: format!(
                "{PREAMBLE} Please analyze the provided invoice text and extract the following information:\n\n\
                 {fields_text}\n\n\
                 {RESPONSE_RULES}\n\n\
                 Invoice text:\n{body}\n\n\
                 Extract the data now:"
            ),
            attachment: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ImageFormat;

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec {
                name: "Invoice Number".into(),
                description: "The invoice identifier".into(),
            },
            FieldSpec {
                name: "Amount".into(),
                description: "Grand total".into(),
            },
        ]
    }

    #[test]
    fn test_field_list_preserves_order() {
        assert_eq!(
            field_list(&fields()),
            "- Invoice Number: The invoice identifier\n- Amount: Grand total"
        );
    }

    #[test]
    fn test_text_prompt_has_no_attachment() {
        let rep = DocumentRepresentation::Text("INV-1 total 100".into());
        let payload = build(&fields(), &rep, "ignored");
        assert!(payload.attachment.is_none());
        assert!(payload.text.contains("Invoice text:\nINV-1 total 100"));
        assert!(payload.text.contains("- Amount: Grand total"));
        assert!(payload.text.contains("use null for that field"));
    }

    #[test]
    fn test_binary_prompt_attaches_pdf() {
        let rep = DocumentRepresentation::RawBinary {
            data: b"%PDF-1.4".to_vec(),
            mime_type: "application/pdf".into(),
        };
        let payload = build(&fields(), &rep, "some text");
        let att = payload.attachment.unwrap();
        assert_eq!(att.mime_type, "application/pdf");
        assert_eq!(att.data, b"%PDF-1.4");
        assert!(payload.text.contains("provided PDF invoice"));
        assert!(!payload.text.contains("some text"));
    }

    #[test]
    fn test_image_prompt_mentions_both_sources() {
        let rep = DocumentRepresentation::Image {
            data: vec![0x89, b'P', b'N', b'G'],
            format: ImageFormat::Png,
        };
        let payload = build(&fields(), &rep, "page text");
        assert_eq!(payload.attachment.unwrap().mime_type, "image/png");
        assert!(payload.text.contains("both text and image"));
        assert!(payload.text.contains("Text extracted from PDF:\npage text"));

        let blank = build(&fields(), &rep, "  ");
        assert!(!blank.text.contains("Text extracted from PDF"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let rep = DocumentRepresentation::Text("abc".into());
        assert_eq!(build(&fields(), &rep, ""), build(&fields(), &rep, ""));
    }
}
