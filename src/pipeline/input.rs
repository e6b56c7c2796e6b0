//! Document acquisition: turn a URL or path into a local file plus its kind.
//!
//! pdfium wants a file-system path, so downloads land in a private
//! [`TempDir`] owned by the returned [`AcquiredDocument`]. The orchestrator
//! calls [`AcquiredDocument::release`] on every exit path; because `release`
//! consumes the value the directory is removed exactly once, and `TempDir`'s
//! own `Drop` still cleans up if a panic unwinds past us.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Document formats the rasteriser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Png,
    Jpg,
}

impl DocumentKind {
    /// Match a `Content-Type` header value. Generic types yield `None`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("pdf") {
            Some(DocumentKind::Pdf)
        } else if ct.contains("png") {
            Some(DocumentKind::Png)
        } else if ct.contains("jpeg") || ct.contains("jpg") {
            Some(DocumentKind::Jpg)
        } else {
            None
        }
    }

    /// Match a file name or path suffix.
    pub fn from_suffix(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".pdf") {
            Some(DocumentKind::Pdf)
        } else if name.ends_with(".png") {
            Some(DocumentKind::Png)
        } else if name.ends_with(".jpg") || name.ends_with(".jpeg") {
            Some(DocumentKind::Jpg)
        } else {
            None
        }
    }

    /// Recognise the format from its leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(DocumentKind::Pdf)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(DocumentKind::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(DocumentKind::Jpg)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Png => "png",
            DocumentKind::Jpg => "jpg",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Infer the kind of a downloaded document.
///
/// Order: content type, URL path suffix (query string ignored), magic bytes,
/// then `pdf`.
pub fn infer_kind(content_type: Option<&str>, url: &str, head: &[u8]) -> DocumentKind {
    content_type
        .and_then(DocumentKind::from_content_type)
        .or_else(|| url_path(url).and_then(|p| DocumentKind::from_suffix(&p)))
        .or_else(|| DocumentKind::sniff(head))
        .unwrap_or(DocumentKind::Pdf)
}

/// The path component of a URL, without query or fragment.
fn url_path(url: &str) -> Option<String> {
    reqwest::Url::parse(url).ok().map(|u| u.path().to_string())
}

/// A document available on local storage.
pub enum AcquiredDocument {
    /// Input was already a local file; it is never deleted.
    Local { path: PathBuf, kind: DocumentKind },
    /// Input was a URL; the bytes live in a private temp directory.
    Downloaded {
        path: PathBuf,
        kind: DocumentKind,
        temp_dir: TempDir,
    },
}

impl AcquiredDocument {
    pub fn path(&self) -> &Path {
        match self {
            AcquiredDocument::Local { path, .. } | AcquiredDocument::Downloaded { path, .. } => path,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            AcquiredDocument::Local { kind, .. } | AcquiredDocument::Downloaded { kind, .. } => *kind,
        }
    }

    /// Remove any temporary storage. Local inputs are left alone.
    pub fn release(self) {
        if let AcquiredDocument::Downloaded { temp_dir, .. } = self {
            let dir = temp_dir.path().to_path_buf();
            match temp_dir.close() {
                Ok(()) => debug!("Removed temp dir {}", dir.display()),
                Err(e) => warn!("Failed to remove temp dir {}: {}", dir.display(), e),
            }
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Acquire the referenced document.
///
/// URLs are downloaded; anything else must be an existing local file.
pub async fn acquire(
    input: &str,
    config: &ExtractionConfig,
) -> Result<AcquiredDocument, ExtractError> {
    let input = input.trim();
    if is_url(input) {
        download_url(input, config).await
    } else if input.is_empty() || input.contains("://") {
        Err(ExtractError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        resolve_local(input)
    }
}

/// Validate a local path and infer its kind from suffix, then magic bytes.
fn resolve_local(path_str: &str) -> Result<AcquiredDocument, ExtractError> {
    let path = PathBuf::from(path_str);

    let mut head = [0u8; 8];
    let read = std::fs::File::open(&path)
        .and_then(|mut f| f.read(&mut head))
        .map_err(|_| ExtractError::FileNotFound { path: path.clone() })?;

    let kind = DocumentKind::from_suffix(path_str)
        .or_else(|| DocumentKind::sniff(&head[..read]))
        .unwrap_or(DocumentKind::Pdf);

    debug!("Resolved local {} document: {}", kind, path.display());
    Ok(AcquiredDocument::Local { path, kind })
}

/// Download a URL into a fresh temp directory.
async fn download_url(
    url: &str,
    config: &ExtractionConfig,
) -> Result<AcquiredDocument, ExtractError> {
    info!("Downloading document from: {}", url);
    let secs = config.download_timeout_secs;

    let failed = |reason: String| ExtractError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(classify)?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response.bytes().await.map_err(classify)?;
    let kind = infer_kind(content_type.as_deref(), url, &bytes);

    let temp_dir = match config.temp_dir {
        Some(ref root) => TempDir::new_in(root),
        None => TempDir::new(),
    }
    .map_err(|e| ExtractError::Internal(format!("Failed to create temp dir: {}", e)))?;

    let path = temp_dir.path().join(format!("document.{}", kind.extension()));
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ExtractError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!(
        "Downloaded {} bytes ({}, content-type {:?}) to {}",
        bytes.len(),
        kind,
        content_type,
        path.display()
    );

    Ok(AcquiredDocument::Downloaded {
        path,
        kind,
        temp_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/bill.pdf"));
        assert!(is_url("http://example.com/bill.png"));
        assert!(!is_url("/tmp/bill.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn content_type_wins_over_suffix() {
        let kind = infer_kind(Some("image/png"), "https://x.test/scan.pdf", b"%PDF-1.7");
        assert_eq!(kind, DocumentKind::Png);
    }

    #[test]
    fn suffix_ignores_query_string() {
        let url = "https://blob.test/assets/sample_2.png?sv=2025-07-05&sig=abc%3D";
        let kind = infer_kind(Some("application/octet-stream"), url, b"");
        assert_eq!(kind, DocumentKind::Png);
        assert_eq!(
            infer_kind(None, "https://x.test/a.JPEG?x=1", b""),
            DocumentKind::Jpg
        );
    }

    #[test]
    fn magic_bytes_then_default() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0];
        assert_eq!(infer_kind(None, "https://x.test/doc", &jpeg), DocumentKind::Jpg);
        assert_eq!(infer_kind(None, "https://x.test/doc", b"hello"), DocumentKind::Pdf);
    }

    #[test]
    fn content_type_variants() {
        assert_eq!(
            DocumentKind::from_content_type("application/pdf; charset=binary"),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(DocumentKind::from_content_type("image/jpeg"), Some(DocumentKind::Jpg));
        assert_eq!(DocumentKind::from_content_type("text/html"), None);
    }

    #[tokio::test]
    async fn local_file_is_not_removed_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bill.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nrest").unwrap();

        let doc = acquire(path.to_str().unwrap(), &ExtractionConfig::default())
            .await
            .unwrap();
        assert_eq!(doc.kind(), DocumentKind::Png);
        doc.release();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn local_kind_falls_back_to_magic_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xDB]).unwrap();

        let doc = acquire(path.to_str().unwrap(), &ExtractionConfig::default())
            .await
            .unwrap();
        assert_eq!(doc.kind(), DocumentKind::Jpg);
    }

    #[tokio::test]
    async fn missing_and_invalid_inputs() {
        let config = ExtractionConfig::default();
        let err = acquire("/definitely/not/here.pdf", &config).await.err().unwrap();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));

        let err = acquire("ftp://example.com/bill.pdf", &config).await.err().unwrap();
        assert!(matches!(err, ExtractError::InvalidInput { .. }));

        let err = acquire("   ", &config).await.err().unwrap();
        assert!(matches!(err, ExtractError::InvalidInput { .. }));
    }
}
