//! Page classification heuristic.
//!
//! Best-effort only: the label is derived from item names and counts, never
//! from the model. Pure, so it is tested without any backend.

use crate::output::{BillItem, PageType};

/// Substrings that mark a pharmacy line, matched case-insensitively.
pub const PHARMACY_KEYWORDS: [&str; 5] = ["medicine", "tablet", "capsule", "syrup", "injection"];

/// Pages with fewer items than this (and no pharmacy lines) are final bills.
const FINAL_BILL_MAX_ITEMS: usize = 3;

/// Assign a page type; the first matching rule wins.
///
/// 1. no items → Bill Detail
/// 2. any pharmacy keyword in a name → Pharmacy
/// 3. fewer than three items → Final Bill
/// 4. otherwise → Bill Detail
pub fn classify(items: &[BillItem]) -> PageType {
    if items.is_empty() {
        return PageType::BillDetail;
    }
    if items.iter().any(|i| is_pharmacy_item(&i.item_name)) {
        return PageType::Pharmacy;
    }
    if items.len() < FINAL_BILL_MAX_ITEMS {
        return PageType::FinalBill;
    }
    PageType::BillDetail
}

fn is_pharmacy_item(name: &str) -> bool {
    let name = name.to_lowercase();
    PHARMACY_KEYWORDS.iter().any(|k| name.contains(k))
}
