#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::sync::Arc;
use telemon_server::app;
use telemon_server::state::AppState;
use telemon_storage::{MemoryStore, MetricsStore};
use tower::util::ServiceExt;

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub app: axum::Router,
}

pub fn build_test_context(sign_key: Option<&str>) -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone() as Arc<dyn MetricsStore>, sign_key);
    TestContext {
        store,
        app: app::build_http_app(state),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body should be JSON")
    }
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> TestResponse {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read")
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn request_no_body(app: &axum::Router, method: &str, uri: &str) -> TestResponse {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub async fn post_json(app: &axum::Router, uri: &str, body: &serde_json::Value) -> TestResponse {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

pub fn gzip(raw: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

pub fn gunzip(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(raw)
        .read_to_end(&mut out)
        .expect("gzip body should decode");
    out
}
