use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, response::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rand::Rng;
use std::fmt::Write;
use std::time::Instant;

/// Response header carrying the per-request trace ID.
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Largest request body the server reads, in bytes.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Trace ID stored in request extensions.
#[derive(Clone)]
pub struct TraceId(pub String);

/// Generate a 16-character hex trace ID (8 random bytes).
fn generate_trace_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    let mut s = String::with_capacity(16);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Maximum number of characters to log from request/response body.
const MAX_BODY_LOG_CHARS: usize = 200;

/// Truncate a UTF-8 string to at most `max` bytes, snapping to a char boundary.
fn truncate_body(bytes: &[u8], max: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() > max => {
            let mut end = max;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &s[..end])
        }
        Ok(s) => s.to_string(),
        Err(_) => "<non-utf8 body>".to_string(),
    }
}

fn format_elapsed(elapsed_us: u128) -> String {
    if elapsed_us < 1000 {
        format!("{elapsed_us}µs")
    } else if elapsed_us < 1_000_000 {
        format!("{}ms", elapsed_us / 1000)
    } else {
        format!("{:.1}s", elapsed_us as f64 / 1_000_000.0)
    }
}

/// Reads a response body into memory. A body that cannot be read (or is
/// larger than `limit`) is logged and replaced by an empty 500 response.
pub(crate) async fn buffer_response(
    response: Response,
    limit: usize,
    trace_id: &str,
) -> Result<(Parts, Bytes), Response> {
    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => Ok((parts, bytes)),
        Err(e) => {
            tracing::error!(trace_id = %trace_id, status = parts.status.as_u16(), error = %e, "Failed to read response body");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

/// Request/response logging middleware.
///
/// Runs inside the gzip layers, so logged bodies are plain JSON. A request
/// body that cannot be read (e.g. broken gzip) is answered with 400 here.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = generate_trace_id();
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, method = %method, path = %path, error = %e, "Unreadable request body");
            return (StatusCode::BAD_REQUEST, "unreadable request body").into_response();
        }
    };

    if body_bytes.is_empty() {
        tracing::info!(trace_id = %trace_id, method = %method, path = %path, "--> request");
    } else {
        tracing::info!(
            trace_id = %trace_id,
            method = %method,
            path = %path,
            size = body_bytes.len(),
            body = %truncate_body(&body_bytes, MAX_BODY_LOG_CHARS),
            "--> request"
        );
    }

    let start = Instant::now();
    let response = next.run(Request::from_parts(parts, Body::from(body_bytes))).await;
    let elapsed = format_elapsed(start.elapsed().as_micros());
    let status = response.status();

    let (parts, body_bytes) = match buffer_response(response, usize::MAX, &trace_id).await {
        Ok(buffered) => buffered,
        Err(failed) => return failed,
    };

    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let body_snippet = if is_json || !status.is_success() {
        truncate_body(&body_bytes, MAX_BODY_LOG_CHARS)
    } else {
        String::new()
    };

    let status_code = status.as_u16();
    if status.is_server_error() {
        tracing::error!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, body = %body_snippet, "<-- response");
    } else if status.is_client_error() {
        tracing::warn!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, body = %body_snippet, "<-- response");
    } else if body_snippet.is_empty() {
        tracing::info!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, "<-- response");
    } else {
        tracing::info!(trace_id = %trace_id, status = status_code, elapsed = %elapsed, body = %body_snippet, "<-- response");
    }

    let mut response = Response::from_parts(parts, Body::from(body_bytes));
    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, val);
    }
    response
}
