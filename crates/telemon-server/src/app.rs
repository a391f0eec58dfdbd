use crate::state::AppState;
use crate::{api, logging, middleware as mw};
use axum::middleware;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// Builds the HTTP surface.
///
/// Layer order, outermost first: gzip request decompression, gzip response
/// compression, request logging, signature check/signing, handlers. The
/// signature therefore always covers the uncompressed body.
pub fn build_http_app(state: AppState) -> Router {
    api::routes()
        .layer(middleware::from_fn_with_state(state.clone(), mw::signature))
        .layer(middleware::from_fn(logging::request_logging))
        .layer(CompressionLayer::new())
        .layer(RequestDecompressionLayer::new())
        .with_state(state)
}
