use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use serde_json::{json, Map, Value};

use crate::binding::Binding;
use crate::config::SimulationDefaults;
use crate::error::ConfigError;
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::simulation::{coerce_int, resolve, ToolCaller};
use crate::streaming::SSE_CONTENT_TYPE;

/// Shared application state. Read-only after startup.
pub struct AppState {
    pub defaults: SimulationDefaults,
    pub binding: Binding,
    pub tool: Arc<dyn ToolCaller>,
    pub shutdown: ShutdownCoordinator,
    /// Channel capacity for the threaded binding.
    pub stream_buffer: usize,
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        "ok\n",
    )
}

/// POST /tool
///
/// Burns `cpu_spin_ms` of CPU and answers `{"ok": true}`. An unreadable body
/// counts as empty.
pub async fn tool(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    metrics::record_request("tool");

    let body = parse_body(&body).unwrap_or_default();
    let cpu_spin_ms = match body.get("cpu_spin_ms") {
        Some(value) => match coerce_int("cpu_spin_ms", value) {
            Ok(ms) => ms,
            Err(e) => return error_json(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        },
        None => state.defaults.cpu_spin_ms,
    };

    match state.binding.spin(cpu_spin_ms).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

/// POST /api/chat/completions
///
/// Resolves the simulation knobs from the body and streams the simulated
/// response. Parameter errors are answered with 400 before any streaming.
pub async fn chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    metrics::record_request("chat");

    let params = match parse_body(&body).and_then(|map| resolve(&map, &state.defaults)) {
        Ok(params) => params,
        Err(e) => {
            metrics::record_config_error();
            tracing::debug!(error = %e, "Rejecting request");
            return error_json(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    let guard = state.shutdown.register_stream();
    tracing::debug!(
        stream = guard.id(),
        binding = state.binding.as_str(),
        frames = params.frames,
        delay_ms = params.delay_ms,
        bytes_per_frame = params.bytes_per_frame,
        cpu_spin_ms = params.cpu_spin_ms,
        fanout = params.fanout,
        fanout_mode = params.fanout_mode.as_str(),
        "Starting simulated stream"
    );

    let records = state
        .binding
        .open_stream(params, state.tool.clone(), guard, state.stream_buffer);

    (
        [
            (header::CONTENT_TYPE, SSE_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        [("X-Accel-Buffering", "no")],
        Body::from_stream(records),
    )
        .into_response()
}

/// GET /micro/plain?bytes=N
pub async fn micro_plain(Query(query): Query<HashMap<String, String>>) -> Response {
    let bytes = match query_int(&query, "bytes", 32) {
        Ok(n) => n.max(1),
        Err(e) => return error_text(&e),
    };

    let mut buf = Vec::new();
    if buf.try_reserve_exact(bytes as usize).is_err() {
        return error_text(&format!("cannot allocate {} bytes", bytes));
    }
    buf.resize(bytes as usize, b'x');

    ([(header::CONTENT_TYPE, "text/plain")], buf).into_response()
}

/// GET /micro/chunked?bytes=N&chunks=C&delay_ms=D
pub async fn micro_chunked(Query(query): Query<HashMap<String, String>>) -> Response {
    let (bytes, chunks, delay_ms) = match chunked_query(&query) {
        Ok(values) => values,
        Err(e) => return error_text(&e),
    };

    let mut word = Vec::new();
    if word.try_reserve_exact(bytes as usize).is_err() {
        return error_text(&format!("cannot allocate {} bytes", bytes));
    }
    word.resize(bytes as usize, b'x');
    let word = Bytes::from(word);
    let delay = Duration::from_millis(delay_ms as u64);

    // Pause after every chunk, including the last one
    let body = stream::unfold(0i64, move |sent| {
        let word = word.clone();
        async move {
            if sent > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if sent >= chunks {
                return None;
            }
            Some((Ok::<Bytes, Infallible>(word), sent + 1))
        }
    });

    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(body),
    )
        .into_response()
}

fn chunked_query(query: &HashMap<String, String>) -> Result<(i64, i64, i64), String> {
    Ok((
        query_int(query, "bytes", 32)?.max(1),
        query_int(query, "chunks", 1)?.max(1),
        query_int(query, "delay_ms", 0)?.max(0),
    ))
}

/// Parse a request body into a JSON object. An empty body is `{}`.
fn parse_body(body: &[u8]) -> Result<Map<String, Value>, ConfigError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ConfigError::NotAnObject),
        Err(e) => Err(ConfigError::MalformedBody(e.to_string())),
    }
}

fn query_int(query: &HashMap<String, String>, key: &str, default: i64) -> Result<i64, String> {
    match query.get(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| format!("invalid literal for int: {:?}", v)),
        None => Ok(default),
    }
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn error_text(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain")],
        message.to_string(),
    )
        .into_response()
}
