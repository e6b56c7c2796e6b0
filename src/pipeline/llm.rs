//! Model client: send one page image plus the extraction prompt to the
//! vision model and report the raw reply with token estimates.
//!
//! The transport sits behind the [`VisionBackend`] trait so the orchestrator
//! can be driven by an in-memory backend in tests. [`OllamaClient`] speaks the
//! Ollama `/api/generate` protocol:
//!
//! ```text
//! POST {base_url}/api/generate
//! { "model": …, "prompt": …, "images": ["<base64>"], "stream": false, "format": "json" }
//! → 200 { "response": "<model JSON as text>", … }
//! ```
//!
//! Failures are returned as [`PageError`] values, never raised: one bad page
//! must not sink the rest of the bill. Nothing is retried.

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, PageError};
use crate::pipeline::encode;
use crate::pipeline::render::PageImage;
use crate::prompts::bill_page_prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A vision model that answers a text prompt about one image.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Return the model's raw textual answer.
    ///
    /// The `page` field of any returned [`PageError`] is rewritten by the
    /// caller, so implementations may leave it at 0.
    async fn generate(&self, prompt: &str, image_b64: &str) -> Result<String, PageError>;

    /// Cheap readiness probe used by health checks.
    async fn connected(&self) -> bool;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [&'a str; 1],
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default = "empty_reply")]
    response: String,
}

/// Stand-in for a missing `response`: decodes to a page with no items.
fn empty_reply() -> String {
    "{}".to_string()
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// [`VisionBackend`] for an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_timeout_secs: u64,
    health_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_timeout_secs: config.api_timeout_secs,
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }
}

#[async_trait]
impl VisionBackend for OllamaClient {
    async fn generate(&self, prompt: &str, image_b64: &str) -> Result<String, PageError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            images: [image_b64],
            stream: false,
            format: "json",
        };

        let response = self
            .http
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PageError::ModelTimeout {
                        page: 0,
                        secs: self.api_timeout_secs,
                    }
                } else {
                    PageError::ModelUnreachable {
                        page: 0,
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PageError::ModelStatus {
                page: 0,
                status: status.as_u16(),
            });
        }

        let envelope: GenerateResponse =
            response.json().await.map_err(|e| PageError::ModelReply {
                page: 0,
                detail: e.to_string(),
            })?;

        Ok(envelope.response)
    }

    async fn connected(&self) -> bool {
        let response = match self
            .http
            .get(self.tags_url())
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Cannot connect to model server {}: {}", self.base_url, e);
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(
                "Model server {} answered HTTP {}",
                self.base_url,
                response.status()
            );
            return false;
        }

        match response.json::<TagsResponse>().await {
            Ok(tags) => {
                let names: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
                info!("Connected to model server. Available models: {:?}", names);
                if !names.is_empty() && !names.iter().any(|n| *n == self.model) {
                    warn!("Configured model '{}' is not installed", self.model);
                }
            }
            Err(e) => debug!("Could not list models: {}", e),
        }
        true
    }
}

/// A successful model reply for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub raw_text: String,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
}

/// Result of invoking the model for one page.
#[derive(Debug, Clone)]
pub struct PageInvocation {
    pub page_no: usize,
    pub reply: Result<ModelReply, PageError>,
    pub duration_ms: u64,
}

/// Rough token estimate: one token per four characters of prompt, one per
/// kilobyte of base64 image.
pub fn estimate_input_tokens(prompt: &str, image_b64_len: usize) -> u64 {
    (prompt.chars().count() / 4 + image_b64_len / 1000) as u64
}

/// One token per four characters of reply.
pub fn estimate_output_tokens(raw_text: &str) -> u64 {
    (raw_text.chars().count() / 4) as u64
}

/// Build the prompt for `page`, call the backend and attach token estimates.
pub async fn invoke_page(
    backend: &dyn VisionBackend,
    page: &PageImage,
    prompt_template: Option<&str>,
) -> PageInvocation {
    let start = Instant::now();
    let prompt = bill_page_prompt(page.page_no, prompt_template);
    let image_b64 = encode::to_base64(&page.bytes);

    debug!(
        "Page {}: sending {} prompt chars + {} base64 bytes",
        page.page_no,
        prompt.len(),
        image_b64.len()
    );

    let reply = match backend.generate(&prompt, &image_b64).await {
        Ok(raw_text) => {
            let reply = ModelReply {
                estimated_input_tokens: estimate_input_tokens(&prompt, image_b64.len()),
                estimated_output_tokens: estimate_output_tokens(&raw_text),
                raw_text,
            };
            debug!(
                "Page {}: ~{} input tokens, ~{} output tokens",
                page.page_no, reply.estimated_input_tokens, reply.estimated_output_tokens
            );
            Ok(reply)
        }
        Err(e) => {
            let e = e.for_page(page.page_no);
            warn!("{}", e);
            Err(e)
        }
    };

    PageInvocation {
        page_no: page.page_no,
        reply,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
