use crate::error::{ApiError, Result};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::fmt::Write;
use telemon_common::types::{Metric, MetricBatch, MetricIdentity, MetricKind};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_metrics))
        .route("/ping", get(ping))
        .route("/update/", post(update_json))
        .route("/update/{kind}/{id}/{value}", post(update_from_path))
        .route("/updates/", post(update_batch))
        .route("/value/", post(value_json))
        .route("/value/{kind}/{id}", get(value_text))
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

async fn update_from_path(
    State(state): State<AppState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let metric = Metric::parse(&id, &kind, &value)?;
    state.store.save(&metric).await?;
    Ok(StatusCode::OK)
}

async fn update_json(State(state): State<AppState>, body: Bytes) -> Result<Json<Metric>> {
    let metric: Metric = decode(&body)?;
    let stored = state.store.save(&metric).await?;
    Ok(Json(stored))
}

async fn update_batch(State(state): State<AppState>, body: Bytes) -> Result<Json<MetricBatch>> {
    let batch: MetricBatch = decode(&body)?;
    let stored = state.store.save_all(&batch).await?;
    tracing::debug!(count = stored.len(), "Stored metric batch");
    Ok(Json(stored))
}

async fn value_json(State(state): State<AppState>, body: Bytes) -> Result<Json<Metric>> {
    let identity: MetricIdentity = decode(&body)?;
    state
        .store
        .get_by_type_and_id(&identity.id, identity.kind)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn value_text(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<String> {
    let kind: MetricKind = kind.parse()?;
    let metric = state
        .store
        .get_by_type_and_id(&id, kind)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(metric.value.to_string())
}

async fn list_metrics(State(state): State<AppState>) -> Result<Html<String>> {
    let mut page = String::from("<!DOCTYPE html>\n<html><body>\n");
    for kind in [MetricKind::Gauge, MetricKind::Counter] {
        for metric in state.store.get_all_by_type(kind).await? {
            let _ = writeln!(page, "<p>{} - {}</p>", escape(&metric.id), metric.value);
        }
    }
    page.push_str("</body></html>\n");
    Ok(Html(page))
}

async fn ping(State(state): State<AppState>) -> Result<StatusCode> {
    state.store.ping().await?;
    Ok(StatusCode::OK)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
