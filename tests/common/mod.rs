//! Shared fixtures for the integration tests: a scripted vision backend, a
//! throwaway axum server on 127.0.0.1, and synthetic bill images.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use edgequake_bill2json::pipeline::encode;
use edgequake_bill2json::{PageError, VisionBackend};
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Replies handed out in call order; one entry per page.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, PageError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, PageError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionBackend for ScriptedBackend {
    async fn generate(&self, prompt: &str, _image_b64: &str) -> Result<String, PageError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(PageError::ModelUnreachable {
                    page: 0,
                    detail: "script exhausted".into(),
                })
            })
    }

    async fn connected(&self) -> bool {
        true
    }
}

/// Answers every page with the same reply.
pub struct ConstantBackend(pub String);

#[async_trait]
impl VisionBackend for ConstantBackend {
    async fn generate(&self, _prompt: &str, _image_b64: &str) -> Result<String, PageError> {
        Ok(self.0.clone())
    }

    async fn connected(&self) -> bool {
        true
    }
}

/// Model reply JSON for `(name, amount, rate, quantity)` rows.
pub fn reply(page_no: usize, items: &[(&str, f64, f64, f64)]) -> String {
    let items: Vec<_> = items
        .iter()
        .map(|(name, amount, rate, qty)| {
            serde_json::json!({
                "item_name": name,
                "item_amount": amount,
                "item_rate": rate,
                "item_quantity": qty,
            })
        })
        .collect();
    serde_json::json!({ "page_no": page_no.to_string(), "bill_items": items }).to_string()
}

/// A small PNG standing in for a scanned page.
pub fn bill_png() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 48, Rgb([255, 255, 250])));
    encode::encode_png(&img).expect("encode fixture")
}

/// Serve `app` on an ephemeral loopback port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

/// Number of entries left in `dir`.
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
