//! Cross-page deduplication.
//!
//! Multi-page bills often repeat lines: a summary page restates items from
//! the detail pages, or the model reads a carried-over row twice. Items are
//! identified by `(trimmed lowercase name, amount, rate)`. Quantity is not
//! part of the key, so two lines that differ only in quantity collapse into
//! the first one seen.

use crate::output::PageRecord;
use std::collections::HashSet;
use tracing::debug;

/// Identity of an item for deduplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    name: String,
    amount_bits: u64,
    rate_bits: u64,
}

impl ItemKey {
    pub fn new(name: &str, amount: f64, rate: f64) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            amount_bits: exact_bits(amount),
            rate_bits: exact_bits(rate),
        }
    }
}

/// Bit pattern for exact equality; `-0.0` and `0.0` share one key.
fn exact_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// Deduplicated pages plus the number of items removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupReport {
    pub pages: Vec<PageRecord>,
    pub removed: usize,
}

/// Remove repeated items across all pages in a single pass.
///
/// The first occurrence in page order survives and relative order is kept.
/// Every page is kept, even one whose items were all repeats; page types are
/// not recomputed.
pub fn deduplicate(pages: Vec<PageRecord>) -> DedupReport {
    let mut seen: HashSet<ItemKey> = HashSet::new();
    let mut removed = 0;
    let mut out = Vec::with_capacity(pages.len());

    for mut page in pages {
        let before = page.bill_items.len();
        page.bill_items.retain(|item| {
            seen.insert(ItemKey::new(&item.item_name, item.item_amount, item.item_rate))
        });
        let dropped = before - page.bill_items.len();
        if dropped > 0 {
            debug!("Page {}: removed {} duplicate item(s)", page.page_no, dropped);
        }
        removed += dropped;
        out.push(page);
    }

    DedupReport {
        pages: out,
        removed,
    }
}
