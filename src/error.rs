//! Error types for the edgequake-bill2json library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the bill cannot be processed at all
//!   (download failed, corrupt PDF, pdfium missing). Returned as
//!   `Err(ExtractError)` from [`crate::BillExtractor::extract`] and folded
//!   into an `is_success: false` envelope by
//!   [`crate::BillExtractor::extract_bill_data`].
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (model unreachable,
//!   garbage JSON) but every other page is fine. Stored inside
//!   [`crate::output::PageOutcome::Failed`] and otherwise invisible in the
//!   wire response, where the page simply contributes no items.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse grouping of [`ExtractError`] variants by pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Fetching the document (network, timeout, HTTP status, missing file).
    Acquisition,
    /// Turning the document into page images.
    Rasterization,
    /// Builder validation.
    Configuration,
    /// Anything else.
    Internal,
}

/// All fatal errors returned by the edgequake-bill2json library.
///
/// Page-level failures use [`PageError`] and never surface here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Acquisition errors ────────────────────────────────────────────────
    /// The input string is neither an HTTP(S) URL nor a local file path.
    #[error("Invalid document reference '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// Local input file does not exist or cannot be read.
    #[error("Document not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The URL was valid but the transfer failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The document host answered with a non-2xx status.
    #[error("Failed to download '{url}': HTTP {status}")]
    DownloadStatus { url: String, status: u16 },

    // ── Rasterization errors ──────────────────────────────────────────────
    /// The document kind has no rasteriser.
    #[error("Unsupported document type '{kind}' for '{path}'")]
    UnsupportedKind { path: PathBuf, kind: String },

    /// The document could not be opened or decoded.
    #[error("Document '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// The document opened fine but contains no pages.
    #[error("Document '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// The pipeline stage this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExtractError::InvalidInput { .. }
            | ExtractError::FileNotFound { .. }
            | ExtractError::DownloadFailed { .. }
            | ExtractError::DownloadTimeout { .. }
            | ExtractError::DownloadStatus { .. } => ErrorCategory::Acquisition,
            ExtractError::UnsupportedKind { .. }
            | ExtractError::CorruptDocument { .. }
            | ExtractError::EmptyDocument { .. }
            | ExtractError::RasterisationFailed { .. }
            | ExtractError::PdfiumBindingFailed(_) => ErrorCategory::Rasterization,
            ExtractError::InvalidConfig(_) => ErrorCategory::Configuration,
            ExtractError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

/// A non-fatal error for a single page.
///
/// The first four variants are model-invocation failures; `ResponseDecode`
/// means the model answered but the answer was not usable JSON.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PageError {
    /// Connection refused, DNS failure, broken transfer.
    #[error("Page {page}: model backend unreachable: {detail}")]
    ModelUnreachable { page: usize, detail: String },

    /// The model call exceeded the per-call timeout.
    #[error("Page {page}: model call timed out after {secs}s")]
    ModelTimeout { page: usize, secs: u64 },

    /// The model endpoint answered with a non-200 status.
    #[error("Page {page}: model backend returned HTTP {status}")]
    ModelStatus { page: usize, status: u16 },

    /// The endpoint answered 200 but the envelope lacked a `response` field.
    #[error("Page {page}: malformed model envelope: {detail}")]
    ModelReply { page: usize, detail: String },

    /// The model's answer could not be decoded into bill items.
    #[error("Page {page}: could not decode model output: {detail}")]
    ResponseDecode { page: usize, detail: String },
}

impl PageError {
    /// 1-based page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::ModelUnreachable { page, .. }
            | PageError::ModelTimeout { page, .. }
            | PageError::ModelStatus { page, .. }
            | PageError::ModelReply { page, .. }
            | PageError::ResponseDecode { page, .. } => *page,
        }
    }

    /// True when the model replied but the reply was unusable.
    pub fn is_decode(&self) -> bool {
        matches!(self, PageError::ResponseDecode { .. })
    }

    /// Rewrite the page number; backends don't know which page they serve.
    pub(crate) fn for_page(mut self, page_no: usize) -> Self {
        match &mut self {
            PageError::ModelUnreachable { page, .. }
            | PageError::ModelTimeout { page, .. }
            | PageError::ModelStatus { page, .. }
            | PageError::ModelReply { page, .. }
            | PageError::ResponseDecode { page, .. } => *page = page_no,
        }
        self
    }
}
