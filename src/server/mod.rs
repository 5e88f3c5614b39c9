//! HTTP surface: routes, handlers and the TCP accept loop.

mod handlers;
mod listener;

pub use handlers::AppState;
pub use listener::HttpListener;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

/// Build the application router.
pub fn build_router(state: Arc<AppState>, gzip: bool) -> Router {
    let router = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/tool", post(handlers::tool))
        .route("/api/chat/completions", post(handlers::chat_completions))
        .route("/micro/plain", get(handlers::micro_plain))
        .route("/micro/chunked", get(handlers::micro_chunked))
        .with_state(state);

    if gzip {
        router.layer(CompressionLayer::new())
    } else {
        router
    }
}
