// src/document.rs

use lopdf::Document;
use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

use crate::rasterize::PageRasterizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
        }
    }
}

/// One way of presenting the uploaded document to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRepresentation {
    /// Best-effort page text; empty when nothing could be extracted.
    Text(String),
    /// Page one rendered to a raster image.
    Image { data: Vec<u8>, format: ImageFormat },
    /// The upload exactly as received.
    RawBinary { data: Vec<u8>, mime_type: String },
}

/// Derive every available representation from the uploaded bytes,
/// ordered raw binary, image, text.
///
/// Each representation is attempted independently; a failure in one is
/// logged and never prevents the others.
pub fn load(bytes: &[u8], rasterizer: Option<&dyn PageRasterizer>) -> Vec<DocumentRepresentation> {
    let mut reps = Vec::with_capacity(3);

    reps.push(DocumentRepresentation::RawBinary {
        data: bytes.to_vec(),
        mime_type: sniff_mime_type(bytes).to_string(),
    });

    match rasterizer {
        // pdf2image panics when the poppler process cannot be spawned
        Some(r) => match panic::catch_unwind(AssertUnwindSafe(|| r.render_first_page(bytes))) {
            Ok(Ok(png)) => reps.push(DocumentRepresentation::Image {
                data: png,
                format: ImageFormat::Png,
            }),
            Ok(Err(e)) => warn!(error = %e, "Rasterization failed — skipping image representation"),
            Err(_) => warn!("Rasterizer panicked — skipping image representation"),
        },
        None => info!("No rasterizer available — skipping image representation"),
    }

    reps.push(DocumentRepresentation::Text(extract_text(bytes)));
    reps
}

/// The extracted text among `reps`, or `""` when there is none.
pub fn extracted_text(reps: &[DocumentRepresentation]) -> &str {
    reps.iter()
        .find_map(|r| match r {
            DocumentRepresentation::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .unwrap_or("")
}

fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF-") {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

/// Best-effort text extraction. Returns an empty string on any failure,
/// and for documents that look scanned.
pub fn extract_text(pdf_bytes: &[u8]) -> String {
    // lopdf and pdf-extract both panic on some malformed inputs
    panic::catch_unwind(AssertUnwindSafe(|| extract_text_unguarded(pdf_bytes))).unwrap_or_else(
        |_| {
            warn!("PDF text extraction panicked — treating document as textless");
            String::new()
        },
    )
}

fn extract_text_unguarded(pdf_bytes: &[u8]) -> String {
    // --- Phase 1: structural check with lopdf ---
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "Failed to parse PDF — no text available");
            return String::new();
        }
    };

    // image-only pages carry no text layer to extract
    if looks_like_scanned(&doc) {
        info!("PDF looks scanned — skipping text extraction");
        return String::new();
    }

    // --- Phase 2: full text extraction ---
    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            info!(chars = meaningful, "Text extracted from PDF");
            text
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed — may be scanned or corrupted");
            String::new()
        }
    }
}

/// Heuristic: a page with XObject images but no Font resources is almost
/// certainly a scan. Returns true when at least 80% of pages look that way.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_dict) = doc.get_object(*object_id).and_then(|o| o.as_dict()) else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let has_entries = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|x| doc.dereference(x).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if has_entries(b"XObject") && !has_entries(b"Font") {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= 0.8
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::rasterize::RasterError;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// A one-page PDF with a single line of Courier text.
    pub(crate) fn sample_pdf(line: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    /// A one-page PDF whose only content is an image XObject, no fonts.
    fn scanned_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0x80],
        ));
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![595.into(), 0.into(), 0.into(), 842.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec!["Im1".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    struct FixedRasterizer(Result<Vec<u8>, ()>);

    struct PanickingRasterizer;

    impl PageRasterizer for PanickingRasterizer {
        fn render_first_page(&self, _pdf: &[u8]) -> Result<Vec<u8>, RasterError> {
            panic!("failed to execute process")
        }
    }

    impl PageRasterizer for FixedRasterizer {
        fn render_first_page(&self, _pdf: &[u8]) -> Result<Vec<u8>, RasterError> {
            self.0.clone().map_err(|_| RasterError::NoPages)
        }
    }

    #[test]
    fn test_garbage_bytes() {
        let reps = load(b"this is not a pdf", None);
        assert_eq!(reps.len(), 2);
        assert!(matches!(
            &reps[0],
            DocumentRepresentation::RawBinary { mime_type, .. } if mime_type == "application/octet-stream"
        ));
        assert_eq!(extracted_text(&reps), "");
    }

    #[test]
    fn test_text_pdf_yields_text() {
        let pdf = sample_pdf("Invoice INV-42");
        let reps = load(&pdf, None);
        assert!(matches!(
            &reps[0],
            DocumentRepresentation::RawBinary { mime_type, .. } if mime_type == "application/pdf"
        ));
        assert!(extracted_text(&reps).contains("INV-42"));
    }

    #[test]
    fn test_rasterizer_output_is_second() {
        let pdf = sample_pdf("x");
        let r = FixedRasterizer(Ok(vec![1, 2, 3]));
        let reps = load(&pdf, Some(&r));
        assert_eq!(reps.len(), 3);
        assert_eq!(
            reps[1],
            DocumentRepresentation::Image {
                data: vec![1, 2, 3],
                format: ImageFormat::Png
            }
        );
        assert!(matches!(reps[2], DocumentRepresentation::Text(_)));
    }

    #[test]
    fn test_rasterizer_failure_is_swallowed() {
        let r = FixedRasterizer(Err(()));
        let reps = load(b"junk", Some(&r));
        assert!(!reps
            .iter()
            .any(|rep| matches!(rep, DocumentRepresentation::Image { .. })));
        assert_eq!(reps.len(), 2);
    }

    #[test]
    fn test_rasterizer_panic_keeps_other_representations() {
        let pdf = sample_pdf("Invoice INV-7");
        let reps = load(&pdf, Some(&PanickingRasterizer));
        assert_eq!(reps.len(), 2);
        assert!(matches!(reps[0], DocumentRepresentation::RawBinary { .. }));
        assert!(extracted_text(&reps).contains("INV-7"));
    }

    #[test]
    fn test_scanned_pdf_skips_text_extraction() {
        let scanned = scanned_pdf();
        let doc = Document::load_mem(&scanned).unwrap();
        assert!(looks_like_scanned(&doc));
        assert_eq!(extract_text(&scanned), "");

        let text_pdf = Document::load_mem(&sample_pdf("Invoice")).unwrap();
        assert!(!looks_like_scanned(&text_pdf));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }
}
