//! Configuration types for bill extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The CLI maps its flags onto the
//! builder; library users either use the builder directly or start from
//! [`ExtractionConfig::from_env`].

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Default Ollama endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "llama3.2-vision:11b";

/// Configuration for a bill extraction.
///
/// # Example
/// ```rust
/// use edgequake_bill2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .base_url("http://gpu-box:11434")
///     .model("llama3.2-vision:11b")
///     .dpi(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Base URL of the Ollama-compatible model server. Default: `http://localhost:11434`.
    pub base_url: String,

    /// Vision model name passed in every generate request.
    pub model: String,

    /// Rendering DPI for PDF pages. Range: 72–600. Default: 300.
    ///
    /// Bills carry small print (batch numbers, unit rates) that becomes
    /// unreadable for the model well before it does for a human. 300 DPI keeps
    /// 6-pt text legible.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 6000.
    ///
    /// An A4 page at 300 DPI is 2480 × 3508 px; the cap only bites for
    /// oversized pages, which would otherwise exhaust memory.
    pub max_rendered_pixels: u32,

    /// Download timeout for URL inputs in seconds. Default: 30.
    pub download_timeout_secs: u64,

    /// Per-page model call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Timeout for the `connected()` health probe in seconds. Default: 5.
    pub health_timeout_secs: u64,

    /// Custom page prompt. `{page_no}` is replaced with the 1-based page
    /// number. If None, uses [`crate::prompts::BILL_PAGE_PROMPT`].
    pub prompt_template: Option<String>,

    /// Parent directory for downloaded documents. If None, the system temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dpi: 300,
            max_rendered_pixels: 6000,
            download_timeout_secs: 30,
            api_timeout_secs: 120,
            health_timeout_secs: 5,
            prompt_template: None,
            temp_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("health_timeout_secs", &self.health_timeout_secs)
            .field("prompt_template", &self.prompt_template.as_ref().map(|p| p.len()))
            .field("temp_dir", &self.temp_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults, overridden by `OLLAMA_URL` and `OLLAMA_MODEL` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            if !url.is_empty() {
                config.base_url = url.trim_end_matches('/').to_string();
            }
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            if !model.is_empty() {
                config.model = model;
            }
        }
        config
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn health_timeout_secs(mut self, secs: u64) -> Self {
        self.config.health_timeout_secs = secs;
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(ExtractError::InvalidConfig(format!(
                "base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("model must not be empty".into()));
        }
        if c.download_timeout_secs == 0 || c.api_timeout_secs == 0 || c.health_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig("timeouts must be ≥ 1s".into()));
        }
        if let Some(ref t) = c.prompt_template {
            if t.trim().is_empty() {
                return Err(ExtractError::InvalidConfig("prompt template is empty".into()));
            }
        }
        Ok(self.config)
    }
}
