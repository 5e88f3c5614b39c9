//! SSE (Server-Sent Events) formatting.
//!
//! Payloads are laid out like Python's `json.dumps` defaults: `", "` and
//! `": "` separators, non-ASCII characters escaped as `\uXXXX`.

use std::fmt;
use std::io;

use bytes::Bytes;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{json, Value};

use crate::simulation::StreamEvent;

/// Media type of streamed responses.
pub const SSE_CONTENT_TYPE: &str = "text/event-stream";

/// Encode one event as a complete SSE record.
///
/// An `Error` encodes to its own record only; streams always follow it with
/// `Done`, so the wire carries the error record then the `[DONE]` record.
pub fn encode(event: &StreamEvent) -> Bytes {
    match event {
        StreamEvent::Delta { content } => format_sse_chunk(content),
        StreamEvent::Done => format_sse_done(),
        StreamEvent::Error { message } => format_sse_error(message),
    }
}

/// Format a content chunk as an SSE event.
pub fn format_sse_chunk(content: &str) -> Bytes {
    let data = json!({ "choices": [{ "delta": { "content": content } }] });
    format!("data: {}\n\n", Spaced(&data)).into()
}

/// Format the done marker as an SSE event.
pub fn format_sse_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Format an error as an SSE event.
pub fn format_sse_error(error: &str) -> Bytes {
    let data = json!({ "error": error });
    format!("data: {}\n\n", Spaced(&data)).into()
}

/// Displays a JSON value with spaced separators.
struct Spaced<'a>(&'a Value);

impl fmt::Display for Spaced<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::with_capacity(128);
        let mut ser = Serializer::with_formatter(&mut buf, SpacedFormatter);
        self.0.serialize(&mut ser).map_err(|_| fmt::Error)?;
        f.write_str(std::str::from_utf8(&buf).map_err(|_| fmt::Error)?)
    }
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        // Everything outside printable ASCII goes out as UTF-16 escapes
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}
