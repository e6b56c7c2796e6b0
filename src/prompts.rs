//! Extraction prompt for the vision model.
//!
//! The prompt lives here rather than in [`crate::pipeline::llm`] so it can be
//! inspected by unit tests and tweaked without touching transport code.
//! Callers can override it via
//! [`crate::config::ExtractionConfig::prompt_template`].

/// Placeholder replaced with the 1-based page number.
pub const PAGE_PLACEHOLDER: &str = "{page_no}";

/// Default per-page prompt.
///
/// The JSON example doubles as the schema; the model is told to reply with
/// JSON only, and the request additionally sets `format: "json"`.
pub const BILL_PAGE_PROMPT: &str = r#"You are analyzing page {page_no} of a medical/hospital bill. Extract ALL line items with extreme precision.

CRITICAL RULES:
1. Extract EVERY single item with its name, amount, rate, and quantity
2. Do NOT skip any entries
3. Do NOT double-count any items
4. item_name: Extract EXACTLY as written in the bill
5. item_amount: Net amount after discounts (final amount to pay for this item)
6. item_rate: Price per unit as shown
7. item_quantity: Quantity purchased

Return ONLY valid JSON (no markdown, no explanation):
{
  "page_no": "{page_no}",
  "bill_items": [
    {
      "item_name": "exact name from bill",
      "item_amount": 100.50,
      "item_rate": 50.25,
      "item_quantity": 2.0
    }
  ]
}

If no items found, return empty bill_items array.
Analyze this bill page now:"#;

/// Render the prompt for `page_no`, using `template` when given.
pub fn bill_page_prompt(page_no: usize, template: Option<&str>) -> String {
    template
        .unwrap_or(BILL_PAGE_PROMPT)
        .replace(PAGE_PLACEHOLDER, &page_no.to_string())
}
