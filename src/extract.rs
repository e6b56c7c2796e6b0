//! Extraction entry points: run the whole pipeline for one bill.
//!
//! A call moves through
//! `Init → Acquiring → Rasterizing → PerPageProcessing → Deduplicating → Assembling`.
//! Acquisition and rasterisation errors end the call with an
//! [`ExtractError`]; per-page model or decode errors only cost that page its
//! items. The acquired document is released before the call returns, on
//! every path.
//!
//! Each call creates its own [`TokenUsage`], so one [`BillExtractor`] can
//! serve concurrent requests without their counters mixing.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::output::{
    ExtractionOutput, ExtractionResult, ExtractionStats, PageOutcome, PageRecord, TokenUsage,
};
use crate::pipeline::llm::{self, OllamaClient, VisionBackend};
use crate::pipeline::render::{self, PageImage};
use crate::pipeline::{classify, dedup, input, parse};
use crate::progress::ProgressCallback;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Extracts line items from bills with a vision model.
///
/// # Example
/// ```rust,no_run
/// use edgequake_bill2json::{BillExtractor, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = BillExtractor::new(ExtractionConfig::from_env())?;
/// let result = extractor
///     .extract_bill_data("https://example.com/bills/sample_2.png")
///     .await;
/// println!("{}", serde_json::to_string_pretty(&result)?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BillExtractor {
    config: ExtractionConfig,
    backend: Arc<dyn VisionBackend>,
}

impl std::fmt::Debug for BillExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillExtractor")
            .field("config", &self.config)
            .field("backend", &"<dyn VisionBackend>")
            .finish()
    }
}

impl BillExtractor {
    /// Extractor talking to the Ollama server named in `config`.
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        let client = OllamaClient::new(&config)?;
        Ok(Self::with_backend(config, Arc::new(client)))
    }

    /// Extractor with a caller-supplied backend.
    pub fn with_backend(config: ExtractionConfig, backend: Arc<dyn VisionBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Health probe: is the model backend reachable?
    pub async fn connected(&self) -> bool {
        self.backend.connected().await
    }

    /// Extract a bill and return the wire envelope.
    ///
    /// Never fails: fatal errors become `is_success: false` with the error
    /// message, no pages and zeroed usage.
    pub async fn extract_bill_data(&self, document: &str) -> ExtractionResult {
        match self.extract(document).await {
            Ok(output) => output.into_result(),
            Err(e) => {
                warn!("Extraction failed: {}", e);
                ExtractionResult::failure(&e)
            }
        }
    }

    /// Synchronous wrapper around [`BillExtractor::extract_bill_data`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn extract_sync(&self, document: &str) -> ExtractionResult {
        match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(self.extract_bill_data(document)),
            Err(e) => ExtractionResult::failure(&ExtractError::Internal(format!(
                "Failed to create tokio runtime: {}",
                e
            ))),
        }
    }

    /// Extract a bill, returning per-page outcomes and stats as well.
    ///
    /// # Errors
    /// Only acquisition and rasterisation failures (plus internal errors)
    /// are returned; page failures show up in `output.outcomes`.
    pub async fn extract(&self, document: &str) -> Result<ExtractionOutput, ExtractError> {
        let total_start = Instant::now();
        let mut usage = TokenUsage::default();
        info!("Starting bill extraction: {}", document);

        // ── Step 1: Acquire ──────────────────────────────────────────────────
        let doc = input::acquire(document, &self.config).await?;

        // ── Steps 2–3: Rasterise and process pages ──────────────────────────
        let processed = self.process_document(&doc, &mut usage).await;
        doc.release();
        let (outcomes, render_duration_ms, model_duration_ms) = processed?;

        // ── Steps 4–5: Deduplicate and assemble ─────────────────────────────
        let mut output = assemble(outcomes, usage);
        output.stats.render_duration_ms = render_duration_ms;
        output.stats.model_duration_ms = model_duration_ms;
        output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Extraction complete: {} page(s), {} with items, {} item(s), {} duplicate(s) removed, ~{} tokens, {}ms",
            output.stats.total_pages,
            output.pages.len(),
            output.total_item_count(),
            output.stats.duplicates_removed,
            output.usage.total_tokens,
            output.stats.total_duration_ms
        );

        Ok(output)
    }

    /// Rasterise and run every page through the model.
    async fn process_document(
        &self,
        doc: &input::AcquiredDocument,
        usage: &mut TokenUsage,
    ) -> Result<(Vec<PageOutcome>, u64, u64), ExtractError> {
        let render_start = Instant::now();
        let pages = render::rasterize(doc, &self.config).await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;

        let progress = self.config.progress_callback.as_ref();
        if let Some(cb) = progress {
            cb.on_extraction_start(pages.len());
        }

        let model_start = Instant::now();
        let outcomes = process_pages(
            self.backend.as_ref(),
            &pages,
            self.config.prompt_template.as_deref(),
            usage,
            progress,
        )
        .await;
        let model_duration_ms = model_start.elapsed().as_millis() as u64;

        if let Some(cb) = progress {
            let with_items = outcomes
                .iter()
                .filter(|o| matches!(o, PageOutcome::Extracted(_)))
                .count();
            cb.on_extraction_complete(pages.len(), with_items);
        }

        Ok((outcomes, render_duration_ms, model_duration_ms))
    }
}

/// Run pages through model → parser → classifier, strictly in order.
///
/// Token estimates are added to `usage` for every page that got a reply,
/// whether or not it yielded items.
pub async fn process_pages(
    backend: &dyn VisionBackend,
    pages: &[PageImage],
    prompt_template: Option<&str>,
    usage: &mut TokenUsage,
    progress: Option<&ProgressCallback>,
) -> Vec<PageOutcome> {
    let total = pages.len();
    let mut outcomes = Vec::with_capacity(total);

    for page in pages {
        let page_no = page.page_no;
        if let Some(cb) = progress {
            cb.on_page_start(page_no, total);
        }

        let invocation = llm::invoke_page(backend, page, prompt_template).await;

        let outcome = match invocation.reply {
            Err(error) => PageOutcome::Failed { page_no, error },
            Ok(reply) => {
                usage.record(reply.estimated_input_tokens, reply.estimated_output_tokens);
                match parse::parse_page(&reply.raw_text, page_no) {
                    Err(error) => {
                        warn!("{}", error);
                        PageOutcome::Failed { page_no, error }
                    }
                    Ok(items) if items.is_empty() => PageOutcome::NoItems { page_no },
                    Ok(items) => PageOutcome::Extracted(PageRecord {
                        page_no: page_no.to_string(),
                        page_type: classify::classify(&items),
                        bill_items: items,
                    }),
                }
            }
        };

        match &outcome {
            PageOutcome::Failed { error, .. } => {
                if let Some(cb) = progress {
                    cb.on_page_error(page_no, total, &error.to_string());
                }
            }
            other => {
                info!(
                    "Page {}: found {} item(s) in {}ms",
                    page_no,
                    other.item_count(),
                    invocation.duration_ms
                );
                if let Some(cb) = progress {
                    cb.on_page_complete(page_no, total, other.item_count());
                }
            }
        }

        outcomes.push(outcome);
    }

    outcomes
}

/// Keep pages with items, deduplicate them and compute stats.
///
/// Durations in the returned stats are left at zero.
pub fn assemble(outcomes: Vec<PageOutcome>, usage: TokenUsage) -> ExtractionOutput {
    let mut stats = ExtractionStats {
        total_pages: outcomes.len(),
        ..Default::default()
    };

    let mut kept = Vec::new();
    for outcome in &outcomes {
        match outcome {
            PageOutcome::Extracted(record) => {
                stats.extracted_pages += 1;
                kept.push(record.clone());
            }
            PageOutcome::NoItems { .. } => stats.empty_pages += 1,
            PageOutcome::Failed { .. } => stats.failed_pages += 1,
        }
    }

    let report = dedup::deduplicate(kept);
    stats.duplicates_removed = report.removed;

    ExtractionOutput {
        pages: report.pages,
        outcomes,
        usage,
        stats,
    }
}

/// One-shot extraction with configuration from `OLLAMA_URL` / `OLLAMA_MODEL`.
pub async fn extract_bill_data(document: &str) -> ExtractionResult {
    match BillExtractor::new(ExtractionConfig::from_env()) {
        Ok(extractor) => extractor.extract_bill_data(document).await,
        Err(e) => ExtractionResult::failure(&e),
    }
}
