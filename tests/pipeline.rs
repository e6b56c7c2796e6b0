//! Orchestrator tests: per-page fault isolation, token accounting, dedup and
//! cleanup of downloaded documents.
//!
//! No test here needs pdfium or a model server: pages are synthetic PNGs and
//! the model is a scripted in-memory backend.

mod common;

use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use common::{bill_png, entries, reply, spawn_server, ConstantBackend, ScriptedBackend};
use edgequake_bill2json::extract::{assemble, process_pages};
use edgequake_bill2json::pipeline::llm::{estimate_input_tokens, estimate_output_tokens};
use edgequake_bill2json::pipeline::render::PageImage;
use edgequake_bill2json::prompts::bill_page_prompt;
use edgequake_bill2json::{
    BillExtractor, ExtractionConfig, ExtractionProgressCallback, PageError, PageOutcome, PageType,
    TokenUsage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn pages(n: usize) -> Vec<PageImage> {
    (1..=n).map(|i| PageImage::png(i, bill_png())).collect()
}

fn expected_usage(pages: &[PageImage], replies: &[Option<&str>]) -> TokenUsage {
    let mut usage = TokenUsage::default();
    for (page, reply) in pages.iter().zip(replies) {
        if let Some(raw) = reply {
            let b64_len = page.bytes.len().div_ceil(3) * 4;
            usage.record(
                estimate_input_tokens(&bill_page_prompt(page.page_no, None), b64_len),
                estimate_output_tokens(raw),
            );
        }
    }
    usage
}

fn item_sum(result: &edgequake_bill2json::ExtractionResult) -> u64 {
    result
        .data
        .pagewise_line_items
        .iter()
        .map(|p| p.bill_items.len() as u64)
        .sum()
}

// ── Per-page processing ──────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_second_page_yields_single_final_bill() {
    let page1 = reply(1, &[("Consultation Fee", 500.0, 500.0, 1.0)]);
    let page2 = "{\"bill_items\": [ oops".to_string();
    let backend = ScriptedBackend::new(vec![Ok(page1.clone()), Ok(page2.clone())]);
    let pages = pages(2);

    let mut usage = TokenUsage::default();
    let outcomes = process_pages(backend.as_ref(), &pages, None, &mut usage, None).await;

    assert!(matches!(outcomes[1], PageOutcome::Failed { ref error, .. } if error.is_decode()));

    let result = assemble(outcomes, usage).into_result();
    assert!(result.is_success);
    assert_eq!(result.data.pagewise_line_items.len(), 1);
    let page = &result.data.pagewise_line_items[0];
    assert_eq!(page.page_no, "1");
    assert_eq!(page.page_type, PageType::FinalBill);
    assert_eq!(page.bill_items[0].item_name, "Consultation Fee");
    assert_eq!(page.bill_items[0].item_amount, 500.0);
    assert_eq!(result.data.total_item_count, 1);

    // Both pages got a reply, so both are billed.
    assert_eq!(
        result.token_usage,
        expected_usage(&pages, &[Some(&page1), Some(&page2)])
    );
}

#[tokio::test]
async fn model_failure_on_middle_page_keeps_the_others() {
    let r1 = reply(1, &[("Room Rent", 2000.0, 1000.0, 2.0)]);
    let r3 = reply(3, &[("Paracetamol Tablet", 20.0, 2.0, 10.0)]);
    let backend = ScriptedBackend::new(vec![
        Ok(r1.clone()),
        Err(PageError::ModelTimeout { page: 0, secs: 120 }),
        Ok(r3.clone()),
    ]);
    let pages = pages(3);

    let mut usage = TokenUsage::default();
    let outcomes = process_pages(backend.as_ref(), &pages, None, &mut usage, None).await;
    assert_eq!(
        outcomes[1],
        PageOutcome::Failed {
            page_no: 2,
            error: PageError::ModelTimeout { page: 2, secs: 120 },
        }
    );

    let result = assemble(outcomes, usage).into_result();
    assert!(result.is_success);
    let page_nos: Vec<_> = result
        .data
        .pagewise_line_items
        .iter()
        .map(|p| p.page_no.as_str())
        .collect();
    assert_eq!(page_nos, vec!["1", "3"]);
    assert_eq!(result.data.pagewise_line_items[1].page_type, PageType::Pharmacy);

    // The failed call produced no reply and contributes nothing.
    assert_eq!(result.token_usage, expected_usage(&pages, &[Some(&r1), None, Some(&r3)]));
}

#[tokio::test]
async fn empty_page_is_dropped_but_still_counted() {
    let r1 = reply(1, &[]);
    let r2 = reply(2, &[("ECG", 350.0, 350.0, 1.0)]);
    let backend = ScriptedBackend::new(vec![Ok(r1.clone()), Ok(r2.clone())]);
    let pages = pages(2);

    let mut usage = TokenUsage::default();
    let outcomes = process_pages(backend.as_ref(), &pages, None, &mut usage, None).await;
    assert_eq!(outcomes[0], PageOutcome::NoItems { page_no: 1 });

    let output = assemble(outcomes, usage);
    assert_eq!(output.stats.empty_pages, 1);
    let result = output.into_result();
    assert_eq!(result.data.pagewise_line_items.len(), 1);
    assert_eq!(result.data.pagewise_line_items[0].page_no, "2");
    assert_eq!(result.token_usage, expected_usage(&pages, &[Some(&r1), Some(&r2)]));
    assert!(result.token_usage.input_tokens > 0);
}

#[tokio::test]
async fn duplicates_collapse_and_count_matches_items() {
    let backend = ScriptedBackend::new(vec![
        Ok(reply(1, &[
            ("CBC", 300.0, 300.0, 1.0),
            ("Lipid Profile", 900.0, 900.0, 1.0),
            ("Urine Routine", 150.0, 150.0, 1.0),
        ])),
        Ok(reply(2, &[
            (" cbc ", 300.0, 300.0, 3.0),
            ("Ward Charges", 4000.0, 2000.0, 2.0),
        ])),
        Ok(reply(3, &[("LIPID PROFILE", 900.0, 900.0, 1.0)])),
    ]);

    let mut usage = TokenUsage::default();
    let outcomes = process_pages(backend.as_ref(), &pages(3), None, &mut usage, None).await;
    let output = assemble(outcomes, usage);
    assert_eq!(output.stats.duplicates_removed, 2);

    let result = output.into_result();
    assert_eq!(result.data.total_item_count, 4);
    assert_eq!(result.data.total_item_count, item_sum(&result));
    // Page 3 only held a duplicate; it stays, with no items.
    assert_eq!(result.data.pagewise_line_items.len(), 3);
    assert!(result.data.pagewise_line_items[2].bill_items.is_empty());
    // Classified before dedup: page 2 had two items.
    assert_eq!(result.data.pagewise_line_items[1].page_type, PageType::FinalBill);
    assert_eq!(result.data.pagewise_line_items[1].bill_items.len(), 1);
}

#[tokio::test]
async fn prompts_carry_page_numbers_in_order() {
    let backend = ScriptedBackend::new(vec![Ok(reply(1, &[])), Ok(reply(2, &[]))]);
    let mut usage = TokenUsage::default();
    process_pages(backend.as_ref(), &pages(2), None, &mut usage, None).await;

    let prompts = backend.prompts();
    assert!(prompts[0].contains("page 1 of a medical/hospital bill"));
    assert!(prompts[1].contains("page 2 of a medical/hospital bill"));
}

#[derive(Default)]
struct Events {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    items: AtomicUsize,
}

impl ExtractionProgressCallback for Events {
    fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_complete(&self, _page_num: usize, _total_pages: usize, item_count: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.items.fetch_add(item_count, Ordering::SeqCst);
    }
    fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_events_follow_outcomes() {
    let backend = ScriptedBackend::new(vec![
        Ok(reply(1, &[("A", 1.0, 1.0, 1.0), ("B", 2.0, 2.0, 1.0)])),
        Err(PageError::ModelStatus { page: 0, status: 500 }),
        Ok(reply(3, &[])),
    ]);
    let events = Arc::new(Events::default());
    let cb: Arc<dyn ExtractionProgressCallback> = events.clone();

    let mut usage = TokenUsage::default();
    process_pages(backend.as_ref(), &pages(3), None, &mut usage, Some(&cb)).await;

    assert_eq!(events.started.load(Ordering::SeqCst), 3);
    assert_eq!(events.completed.load(Ordering::SeqCst), 2);
    assert_eq!(events.failed.load(Ordering::SeqCst), 1);
    assert_eq!(events.items.load(Ordering::SeqCst), 2);
}

// ── Whole-document extraction over HTTP ──────────────────────────────────────

async fn document_host() -> String {
    let png = bill_png();
    let app = Router::new()
        .route(
            "/assets/sample_2.png",
            get(move || {
                let png = png.clone();
                async move { ([(header::CONTENT_TYPE, "image/png")], png) }
            }),
        )
        .route(
            "/assets/broken.pdf",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/pdf")],
                    b"%PDF-1.4 truncated".to_vec(),
                )
            }),
        )
        .route(
            "/assets/missing.pdf",
            get(|| async { StatusCode::NOT_FOUND }),
        );
    spawn_server(app).await
}

fn extractor_in(temp: &std::path::Path, backend: Arc<dyn edgequake_bill2json::VisionBackend>) -> BillExtractor {
    let config = ExtractionConfig::builder()
        .temp_dir(temp)
        .download_timeout_secs(10)
        .build()
        .unwrap();
    BillExtractor::with_backend(config, backend)
}

#[tokio::test]
async fn image_url_end_to_end_cleans_up() {
    let host = document_host().await;
    let temp = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new(vec![Ok(reply(1, &[
        ("Consultation Fee", 500.0, 500.0, 1.0),
        ("Registration", 100.0, 100.0, 1.0),
    ]))]);
    let extractor = extractor_in(temp.path(), backend);

    let url = format!("{host}/assets/sample_2.png?sv=2025-07-05&sig=abc");
    let result = extractor.extract_bill_data(&url).await;

    assert!(result.is_success, "error: {:?}", result.error);
    assert!(result.error.is_none());
    assert_eq!(result.data.total_item_count, 2);
    assert_eq!(result.data.pagewise_line_items[0].page_type, PageType::FinalBill);
    assert!(result.token_usage.total_tokens > 0);
    assert_eq!(entries(temp.path()), 0, "temp document left behind");
}

#[tokio::test]
async fn acquisition_failure_is_fatal_and_clean() {
    let host = document_host().await;
    let temp = tempfile::tempdir().unwrap();
    let extractor = extractor_in(temp.path(), ScriptedBackend::new(vec![]));

    let result = extractor
        .extract_bill_data(&format!("{host}/assets/missing.pdf"))
        .await;

    assert!(!result.is_success);
    assert!(result.data.pagewise_line_items.is_empty());
    assert_eq!(result.data.total_item_count, 0);
    assert_eq!(result.token_usage, TokenUsage::default());
    assert!(result.error.unwrap().contains("404"));
    assert_eq!(entries(temp.path()), 0);
}

#[tokio::test]
async fn rasterization_failure_is_fatal_and_clean() {
    let host = document_host().await;
    let temp = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new(vec![]);
    let extractor = extractor_in(temp.path(), backend.clone());

    let err = extractor
        .extract(&format!("{host}/assets/broken.pdf"))
        .await
        .err()
        .expect("corrupt PDF must fail");
    assert_eq!(err.category(), edgequake_bill2json::ErrorCategory::Rasterization);
    assert!(backend.prompts().is_empty(), "no page may reach the model");
    assert_eq!(entries(temp.path()), 0);
}

#[tokio::test]
async fn unreachable_host_is_acquisition_error() {
    let temp = tempfile::tempdir().unwrap();
    let extractor = extractor_in(temp.path(), ScriptedBackend::new(vec![]));

    let err = extractor
        .extract("http://127.0.0.1:9/bill.pdf")
        .await
        .err()
        .unwrap();
    assert_eq!(err.category(), edgequake_bill2json::ErrorCategory::Acquisition);
}

#[tokio::test]
async fn concurrent_calls_keep_separate_usage() {
    let host = document_host().await;
    let temp = tempfile::tempdir().unwrap();
    let backend = Arc::new(ConstantBackend(reply(1, &[("Dressing", 150.0, 150.0, 1.0)])));
    let extractor = extractor_in(temp.path(), backend);
    let url = format!("{host}/assets/sample_2.png");

    let (a, b) = tokio::join!(
        extractor.extract_bill_data(&url),
        extractor.extract_bill_data(&url)
    );
    let single = extractor.extract_bill_data(&url).await;

    assert!(a.is_success && b.is_success);
    assert_eq!(a.token_usage, single.token_usage);
    assert_eq!(b.token_usage, single.token_usage);
    assert_eq!(entries(temp.path()), 0);
}

// ── Local files and the sync wrapper ─────────────────────────────────────────

#[test]
fn extract_sync_on_local_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bill.png");
    std::fs::write(&path, bill_png()).unwrap();

    let backend = Arc::new(ConstantBackend(reply(1, &[
        ("Injection Ceftriaxone", 240.0, 80.0, 3.0),
    ])));
    let extractor = BillExtractor::with_backend(ExtractionConfig::default(), backend);

    let result = extractor.extract_sync(path.to_str().unwrap());
    assert!(result.is_success);
    assert_eq!(result.data.pagewise_line_items[0].page_type, PageType::Pharmacy);
    assert!(path.exists(), "local inputs are never deleted");
}
