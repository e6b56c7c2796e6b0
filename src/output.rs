//! Output types: the JSON wire contract plus the richer in-process results.
//!
//! [`ExtractionResult`] is what callers put on the wire. Its field names and
//! nesting are fixed (`is_success`, `token_usage`, `data.pagewise_line_items`,
//! `data.total_item_count`, optional `error`) and are covered by a shape test
//! below. [`ExtractionOutput`] carries the same pages plus per-page outcomes and
//! timing stats for library users who want more than the envelope.

use crate::error::{ExtractError, PageError};
use serde::{Deserialize, Serialize};

/// One line item read off a bill page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillItem {
    /// Item description exactly as printed.
    pub item_name: String,
    /// Net amount payable for this line.
    pub item_amount: f64,
    /// Unit price.
    pub item_rate: f64,
    /// Quantity; fractional values are allowed.
    pub item_quantity: f64,
}

impl BillItem {
    pub fn new(name: impl Into<String>, amount: f64, rate: f64, quantity: f64) -> Self {
        Self {
            item_name: name.into(),
            item_amount: amount,
            item_rate: rate,
            item_quantity: quantity,
        }
    }
}

/// Coarse page category assigned by [`crate::pipeline::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageType {
    #[serde(rename = "Pharmacy")]
    Pharmacy,
    #[serde(rename = "Final Bill")]
    FinalBill,
    #[serde(rename = "Bill Detail")]
    BillDetail,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Pharmacy => "Pharmacy",
            PageType::FinalBill => "Final Bill",
            PageType::BillDetail => "Bill Detail",
        }
    }
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extraction result for one physical page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-based page number, as a string on the wire.
    pub page_no: String,
    pub page_type: PageType,
    pub bill_items: Vec<BillItem>,
}

/// Estimated token usage for one extraction call.
///
/// A fresh value is created per call and threaded through the pipeline by
/// `&mut`; nothing is shared between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Add one page's estimates.
    pub fn record(&mut self, input: u64, output: u64) {
        self.input_tokens += input;
        self.output_tokens += output;
        self.total_tokens += input + output;
    }
}

/// The `data` object of the response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionData {
    pub pagewise_line_items: Vec<PageRecord>,
    pub total_item_count: u64,
}

impl ExtractionData {
    /// Build from deduplicated pages; the count is always derived.
    pub fn from_pages(pages: Vec<PageRecord>) -> Self {
        let total_item_count = pages.iter().map(|p| p.bill_items.len() as u64).sum();
        Self {
            pagewise_line_items: pages,
            total_item_count,
        }
    }
}

/// The response envelope returned by
/// [`crate::BillExtractor::extract_bill_data`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub is_success: bool,
    pub token_usage: TokenUsage,
    pub data: ExtractionData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    /// Envelope for a fatal error: no pages, zero count, zero usage.
    pub fn failure(err: &ExtractError) -> Self {
        Self {
            is_success: false,
            token_usage: TokenUsage::default(),
            data: ExtractionData::default(),
            error: Some(err.to_string()),
        }
    }
}

/// What happened to a single page during per-page processing.
///
/// Keeps "the model found nothing" and "the call failed" apart while
/// [`PageOutcome::into_record`] folds both into the same empty record.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// The page produced at least one item.
    Extracted(PageRecord),
    /// The model answered with an empty item list.
    NoItems { page_no: usize },
    /// Model invocation or decoding failed.
    Failed { page_no: usize, error: PageError },
}

impl PageOutcome {
    pub fn page_no(&self) -> usize {
        match self {
            // page_no strings are produced from usize by this crate
            PageOutcome::Extracted(r) => r.page_no.parse().unwrap_or(0),
            PageOutcome::NoItems { page_no } | PageOutcome::Failed { page_no, .. } => *page_no,
        }
    }

    pub fn item_count(&self) -> usize {
        match self {
            PageOutcome::Extracted(r) => r.bill_items.len(),
            _ => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PageOutcome::Failed { .. })
    }

    /// Collapse to the page-record shape; failures become empty pages.
    pub fn into_record(self) -> PageRecord {
        match self {
            PageOutcome::Extracted(r) => r,
            PageOutcome::NoItems { page_no } | PageOutcome::Failed { page_no, .. } => PageRecord {
                page_no: page_no.to_string(),
                page_type: PageType::BillDetail,
                bill_items: Vec::new(),
            },
        }
    }
}

/// Counters and timings for one extraction call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages produced by the rasteriser.
    pub total_pages: usize,
    /// Pages that yielded at least one item before deduplication.
    pub extracted_pages: usize,
    /// Pages where the model found nothing.
    pub empty_pages: usize,
    /// Pages whose model call or decoding failed.
    pub failed_pages: usize,
    /// Items dropped as cross-page duplicates.
    pub duplicates_removed: usize,
    pub render_duration_ms: u64,
    pub model_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Full result of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    /// Deduplicated pages in page order; a page may be empty if all its items
    /// repeated earlier ones.
    pub pages: Vec<PageRecord>,
    /// One outcome per rasterised page, in page order, before deduplication.
    pub outcomes: Vec<PageOutcome>,
    pub usage: TokenUsage,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    pub fn total_item_count(&self) -> usize {
        self.pages.iter().map(|p| p.bill_items.len()).sum()
    }

    /// Convert into the success envelope.
    pub fn into_result(self) -> ExtractionResult {
        ExtractionResult {
            is_success: true,
            token_usage: self.usage,
            data: ExtractionData::from_pages(self.pages),
            error: None,
        }
    }
}
