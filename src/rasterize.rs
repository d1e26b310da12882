// src/rasterize.rs

use pdf2image::image::ImageFormat as EncodeFormat;
use pdf2image::{DPI, PDF, Pages, RenderOptionsBuilder};
use std::io::Cursor;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("PDF to image conversion failed: {0}")]
    Render(String),

    #[error("document has no renderable pages")]
    NoPages,

    #[error("image encoding failed: {0}")]
    Encode(String),
}

/// Renders the first page of a PDF to PNG bytes.
///
/// Implementations are resolved once at startup; a deployment without a
/// renderer simply has no value of this type.
pub trait PageRasterizer: Send + Sync {
    fn render_first_page(&self, pdf_bytes: &[u8]) -> Result<Vec<u8>, RasterError>;
}

/// Poppler-backed renderer (`pdftoppm` / `pdfinfo` via `pdf2image`).
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    dpi: u32,
}

impl PopplerRasterizer {
    /// Probe for the poppler tools. Returns `None` when they are missing.
    pub fn detect(dpi: u32) -> Option<Self> {
        for tool in ["pdftoppm", "pdfinfo"] {
            let found = Command::new(tool)
                .arg("-v")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok();
            if !found {
                warn!(tool, "Poppler tool not found — image strategy disabled");
                return None;
            }
        }
        info!(dpi, "Poppler rasterizer available");
        Some(Self { dpi })
    }
}

impl PageRasterizer for PopplerRasterizer {
    fn render_first_page(&self, pdf_bytes: &[u8]) -> Result<Vec<u8>, RasterError> {
        let pdf = PDF::from_bytes(pdf_bytes.to_vec()).map_err(|e| RasterError::Render(e.to_string()))?;

        let options = RenderOptionsBuilder::default()
            .resolution(DPI::Uniform(self.dpi))
            .build()
            .map_err(|e| RasterError::Render(e.to_string()))?;

        // pdftoppm page numbers are 1-based
        let pages = pdf
            .render(Pages::Single(1), options)
            .map_err(|e| RasterError::Render(e.to_string()))?;
        let page = pages.into_iter().next().ok_or(RasterError::NoPages)?;

        let mut png = Vec::new();
        page.write_to(&mut Cursor::new(&mut png), EncodeFormat::Png)
            .map_err(|e| RasterError::Encode(e.to_string()))?;

        info!(dpi = self.dpi, bytes = png.len(), "Rendered page one");
        Ok(png)
    }
}
