//! Rasterisation: turn an acquired document into ordered page images.
//!
//! PDFs are rendered page by page with pdfium at the configured DPI and
//! PNG-encoded. PNG and JPEG inputs are decoded once to prove they are
//! readable and then passed through byte-for-byte as a single page.
//!
//! pdfium is not async-safe, so PDF work runs on `spawn_blocking`. Any error
//! here is fatal to the extraction: a half-rendered bill is worse than none.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::encode;
use crate::pipeline::input::{AcquiredDocument, DocumentKind};
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// One page ready to send to the model.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based position in the document.
    pub page_no: usize,
    /// Encoded image bytes (PNG for rendered pages, original bytes otherwise).
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl PageImage {
    pub fn png(page_no: usize, bytes: Vec<u8>) -> Self {
        Self {
            page_no,
            bytes,
            mime_type: "image/png",
        }
    }
}

/// Rasterise the acquired document into 1-indexed page images.
pub async fn rasterize(
    doc: &AcquiredDocument,
    config: &ExtractionConfig,
) -> Result<Vec<PageImage>, ExtractError> {
    let path = doc.path().to_path_buf();
    let kind = doc.kind();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;

    let pages = tokio::task::spawn_blocking(move || match kind {
        DocumentKind::Pdf => render_pdf_blocking(&path, dpi, max_pixels),
        DocumentKind::Png | DocumentKind::Jpg => load_image_blocking(&path, kind),
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))??;

    info!("Rasterised {} page(s) from {} document", pages.len(), kind);
    Ok(pages)
}

/// Validate an image file and wrap its original bytes as page 1.
fn load_image_blocking(path: &Path, kind: DocumentKind) -> Result<Vec<PageImage>, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::CorruptDocument {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let format = image::guess_format(&bytes).map_err(|e| ExtractError::CorruptDocument {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mime_type = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        other => {
            return Err(ExtractError::UnsupportedKind {
                path: path.to_path_buf(),
                kind: format!("{:?} (expected {})", other, kind),
            })
        }
    };

    let img = image::load_from_memory_with_format(&bytes, format).map_err(|e| {
        ExtractError::CorruptDocument {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }
    })?;
    debug!(
        "Loaded {} image {}x{} ({} bytes)",
        mime_type,
        img.width(),
        img.height(),
        bytes.len()
    );

    Ok(vec![PageImage {
        page_no: 1,
        bytes,
        mime_type,
    }])
}

/// Bind pdfium: `PDFIUM_LIB_PATH` (file or directory), then the working
/// directory, then the system library search path.
fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => {
            let p = PathBuf::from(p);
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            Pdfium::bind_to_library(lib)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of PDF rendering.
fn render_pdf_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<PageImage>, ExtractError> {
    let pdfium = bind_pdfium()?;

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| ExtractError::CorruptDocument {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(ExtractError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }
    info!("PDF loaded: {} pages, rendering at {} DPI", total_pages, dpi);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / POINTS_PER_INCH)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32)
        .render_form_data(true)
        .render_annotations(true);

    let mut results = Vec::with_capacity(total_pages);

    for (idx, page) in pages.iter().enumerate() {
        let page_no = idx + 1;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ExtractError::RasterisationFailed {
                page: page_no,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_no,
            image.width(),
            image.height()
        );

        let png = encode::encode_png(&image).map_err(|e| ExtractError::RasterisationFailed {
            page: page_no,
            detail: format!("PNG encoding failed: {}", e),
        })?;

        results.push(PageImage::png(page_no, png));
    }

    Ok(results)
}
