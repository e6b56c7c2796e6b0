//! # edgequake-bill2json
//!
//! Extract line items from scanned medical and hospital bills using a Vision
//! Language Model.
//!
//! Bills arrive as PDFs or phone photos with wildly different layouts. Rather
//! than maintain per-hospital templates, this crate rasterises each page and
//! asks a vision model to read the items off it, then cleans up what comes
//! back: repairs near-miss JSON, labels each page, and drops items repeated
//! across pages.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL / path
//!  │
//!  ├─ 1. Input     download into a scoped temp dir, infer pdf/png/jpg
//!  ├─ 2. Render    PDF pages at 300 DPI via pdfium; images pass through
//!  ├─ 3. VLM       one sequential Ollama call per page (no retries)
//!  ├─ 4. Parse     repair + decode the JSON reply; failures → empty page
//!  ├─ 5. Classify  Pharmacy / Final Bill / Bill Detail heuristic
//!  ├─ 6. Dedup     (name, amount, rate) across the whole bill
//!  └─ 7. Output    response envelope with estimated token usage
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_bill2json::{BillExtractor, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OLLAMA_URL / OLLAMA_MODEL override the defaults
//!     let extractor = BillExtractor::new(ExtractionConfig::from_env())?;
//!     if !extractor.connected().await {
//!         eprintln!("model server is down");
//!     }
//!     let result = extractor.extract_bill_data("bill.pdf").await;
//!     println!("{} items", result.data.total_item_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bill2json` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ErrorCategory, ExtractError, PageError};
pub use extract::{extract_bill_data, BillExtractor};
pub use output::{
    BillItem, ExtractionData, ExtractionOutput, ExtractionResult, ExtractionStats, PageOutcome,
    PageRecord, PageType, TokenUsage,
};
pub use pipeline::llm::{OllamaClient, VisionBackend};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
