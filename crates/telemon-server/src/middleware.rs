use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use telemon_common::sign::{sign, verify, SIGNATURE_HEADER};

use crate::logging::{buffer_response, TraceId, MAX_BODY_BYTES};
use crate::state::AppState;

/// Checks `HashSHA256` on requests and signs responses when a key is configured.
///
/// A request without the header passes unchecked. A header that does not
/// match the HMAC of the (decompressed) body is rejected with 400. Every
/// response body is signed into the same header.
pub async fn signature(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = state.sign_key.clone() else {
        return next.run(req).await;
    };

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::BAD_REQUEST, "unreadable request body").into_response(),
    };

    if let Some(claimed) = parts.headers.get(SIGNATURE_HEADER) {
        let valid = claimed
            .to_str()
            .is_ok_and(|claimed| verify(&key, &body, claimed));
        if !valid {
            tracing::warn!(trace_id = %trace_id, "Request rejected: signature mismatch");
            return (StatusCode::BAD_REQUEST, "signature mismatch").into_response();
        }
    }

    let response = next.run(Request::from_parts(parts, Body::from(body))).await;

    let (mut parts, body) = match buffer_response(response, usize::MAX, &trace_id).await {
        Ok(buffered) => buffered,
        Err(failed) => return failed,
    };
    if let Ok(value) = HeaderValue::from_str(&sign(&key, &body)) {
        parts.headers.insert(SIGNATURE_HEADER, value);
    }
    Response::from_parts(parts, Body::from(body))
}
