//! SSE framing of simulation events.

pub mod sse;

pub use sse::{encode, format_sse_chunk, format_sse_done, format_sse_error, SSE_CONTENT_TYPE};
