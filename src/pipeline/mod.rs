//! Pipeline stages for bill extraction.
//!
//! Each submodule implements exactly one step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ llm ──▶ parse ──▶ classify ──▶ dedup
//! (URL/path) (pdfium)  (VLM)   (JSON)    (heuristic)  (whole doc)
//! ```
//!
//! 1. [`input`]    — fetch the document into a scoped temp dir, infer its kind
//! 2. [`render`]   — rasterise PDF pages at 300 DPI; images pass through
//! 3. [`encode`]   — PNG + base64 helpers shared by `render` and `llm`
//! 4. [`llm`]      — one model call per page, token estimates, no retries
//! 5. [`parse`]    — repair and decode the model reply into items
//! 6. [`classify`] — label each page Pharmacy / Final Bill / Bill Detail
//! 7. [`dedup`]    — drop repeated items across the whole bill

pub mod classify;
pub mod dedup;
pub mod encode;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
