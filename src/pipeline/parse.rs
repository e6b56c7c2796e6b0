//! Response parsing: repair and decode the model's JSON into bill items.
//!
//! Even with `format: "json"` vision models produce a steady trickle of
//! near-misses: fenced code blocks, a sentence before the object, amounts as
//! `"₹1,200.00"` strings, a stray BOM. The repair rules below fix those
//! shapes without guessing at content. Whatever still fails to decode becomes
//! a [`PageError::ResponseDecode`], which the orchestrator folds into an
//! empty page.
//!
//! ## Rule Order
//!
//! 1. Remove invisible Unicode (BOM, zero-width spaces)
//! 2. Strip an outer markdown fence
//! 3. Decode the first `{ … }` (or `[ … ]`) that parses, skipping stray
//!    brackets in surrounding prose
//! 4. Normalise each item's shape

use crate::error::PageError;
use crate::output::BillItem;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Decode `raw` into the items of page `page_no`.
///
/// A reply without a `bill_items` key is a valid, empty page.
pub fn parse_page(raw: &str, page_no: usize) -> Result<Vec<BillItem>, PageError> {
    let decode_err = |detail: String| PageError::ResponseDecode {
        page: page_no,
        detail,
    };

    let cleaned = remove_invisible_chars(raw);
    let cleaned = strip_code_fence(&cleaned);
    let value = first_json_value(cleaned).map_err(decode_err)?;

    let items = match value {
        Value::Object(mut obj) => match obj.remove("bill_items") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(decode_err(format!(
                    "bill_items is {}, expected an array",
                    json_type(&other)
                )))
            }
        },
        // Some models skip the wrapper and answer with the bare list.
        Value::Array(items) => items,
        other => {
            return Err(decode_err(format!(
                "reply is {}, expected an object",
                json_type(&other)
            )))
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(obj) => normalise_item(&obj),
            _ => None,
        })
        .collect())
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Rule 1: Remove invisible Unicode ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'], "")
}

// ── Rule 2: Strip outer markdown fence ───────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

// ── Rule 3: Find the first JSON object or item list ──────────────────────────

/// Decode the first `{ … }` or `[ … ]` in `input` that holds bill data.
///
/// Each `{` and `[` is tried as a start in turn, so brackets in leading prose
/// (`Page [1] result: {…}`) are skipped. Arrays only count when every element
/// is an object. Text after the value is ignored.
fn first_json_value(input: &str) -> Result<Value, String> {
    let mut first_error = None;

    for (start, _) in input.match_indices(['{', '[']) {
        let mut stream = serde_json::Deserializer::from_str(&input[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) if is_bill_shape(&value) => return Ok(value),
            Some(Ok(_)) | None => {}
            Some(Err(e)) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    Err(first_error.unwrap_or_else(|| "no JSON value in reply".to_string()))
}

fn is_bill_shape(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().all(Value::is_object),
        _ => false,
    }
}

// ── Rule 4: Normalise item shape ─────────────────────────────────────────────

fn normalise_item(obj: &Map<String, Value>) -> Option<BillItem> {
    let name = match obj.get("item_name")? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if name.is_empty() {
        return None;
    }

    Some(BillItem {
        item_name: name,
        item_amount: number_field(obj, "item_amount"),
        item_rate: number_field(obj, "item_rate"),
        item_quantity: number_field(obj, "item_quantity"),
    })
}

static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").unwrap());

/// Read a non-negative number. Strings yield their first numeric token with
/// thousands separators removed, so `"Rs. 1,200.00"` reads as 1200.
fn number_field(obj: &Map<String, Value>, key: &str) -> f64 {
    let v = match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_amount(s),
        _ => 0.0,
    };
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

fn parse_amount(s: &str) -> f64 {
    RE_NUMBER
        .find(s)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
        .unwrap_or(0.0)
}
