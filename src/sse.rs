//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module handles parsing of SSE streams from the Copilot API,
//! converting raw byte streams into discrete [`SseEvent`] frames. The
//! decoder is incremental: it holds at most one frame of lookahead and emits
//! each event as soon as its terminating blank line arrives, so arbitrarily
//! long responses can be displayed as they stream in.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::observability::{STREAM_ERRORS, STREAM_EVENTS};

/// A single decoded server-sent event.
///
/// Events are independent of each other; the only cross-line state is the
/// accumulation of multiple `data:` lines within one frame, which join with
/// a newline separator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type, from an `event:` line.
    pub event: Option<String>,

    /// The event identifier, from an `id:` line.
    pub id: Option<String>,

    /// The payload, from one or more `data:` lines.
    pub data: String,
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Frames are delimited by a blank line; `\n` and `\r\n` line endings are
/// both accepted. Comment lines (leading `:`) and unrecognized field names
/// are ignored. A stream that ends mid-frame still flushes the final
/// in-progress event exactly once, since the remote producer may terminate
/// without a trailing blank line.
///
/// Chunk boundaries are arbitrary: a multi-byte UTF-8 sequence split across
/// two chunks is reassembled, not rejected. Malformed content is never
/// fatal; only transport-level failures and genuinely invalid byte
/// sequences surface as `Err` items.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream
        .map(|result| {
            result.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
            })
        })
        .fuse();

    stream::unfold(
        (stream, String::new(), Vec::new()),
        move |(mut stream, mut buffer, mut carry)| async move {
            loop {
                // First check if we have a complete frame in the buffer
                if let Some((event, remaining)) = extract_frame(&buffer) {
                    buffer = remaining;
                    match event {
                        Some(event) => {
                            STREAM_EVENTS.click();
                            return Some((Ok(event), (stream, buffer, carry)));
                        }
                        // Comment-only or empty frame: nothing to emit
                        None => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        carry.extend_from_slice(&bytes);
                        if let Err(e) = drain_decoded(&mut carry, &mut buffer) {
                            STREAM_ERRORS.click();
                            return Some((Err(e), (stream, buffer, carry)));
                        }
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, buffer, carry)));
                    }
                    None => {
                        if !carry.is_empty() {
                            if let Err(e) = drain_decoded(&mut carry, &mut buffer) {
                                STREAM_ERRORS.click();
                                return Some((Err(e), (stream, buffer, carry)));
                            }
                            if !carry.is_empty() {
                                // The stream stopped inside a multi-byte
                                // sequence; the tail can never complete.
                                carry.clear();
                                STREAM_ERRORS.click();
                                return Some((
                                    Err(Error::encoding(
                                        "Stream ended inside a multi-byte UTF-8 sequence",
                                        None,
                                    )),
                                    (stream, buffer, carry),
                                ));
                            }
                            continue;
                        }
                        // End of stream: flush a final in-progress frame that
                        // was never terminated by a blank line.
                        if !buffer.is_empty() {
                            let event = parse_frame(&buffer);
                            buffer.clear();
                            if let Some(event) = event {
                                STREAM_EVENTS.click();
                                return Some((Ok(event), (stream, buffer, carry)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Move the decodable prefix of `carry` into `buffer`.
///
/// An incomplete multi-byte sequence at the end of `carry` stays there until
/// the next chunk completes it. A sequence that can never be valid is
/// dropped and reported as an encoding error; bytes after it remain in
/// `carry` for the next pass.
fn drain_decoded(carry: &mut Vec<u8>, buffer: &mut String) -> Result<()> {
    match std::str::from_utf8(carry) {
        Ok(text) => {
            buffer.push_str(text);
            carry.clear();
            Ok(())
        }
        Err(e) => {
            let valid = e.valid_up_to();
            buffer.push_str(&String::from_utf8_lossy(&carry[..valid]));
            match e.error_len() {
                None => {
                    carry.drain(..valid);
                    Ok(())
                }
                Some(len) => {
                    carry.drain(..valid + len);
                    Err(Error::encoding(
                        format!("Invalid UTF-8 in stream: {e}"),
                        Some(Box::new(e)),
                    ))
                }
            }
        }
    }
}

/// Extract a complete SSE frame from a buffer string.
///
/// Returns `None` while no terminating blank line has been observed; a
/// partial frame is never interpreted as a complete event. When a frame is
/// complete, returns the parsed event (or `None` for a frame with no field
/// lines, which is not emitted) along with the unconsumed remainder.
fn extract_frame(buffer: &str) -> Option<(Option<SseEvent>, String)> {
    let (end, rest_start) = find_frame_boundary(buffer)?;
    let frame = &buffer[..end];
    let rest = buffer[rest_start..].to_string();
    Some((parse_frame(frame), rest))
}

/// Find the first blank line in the buffer.
///
/// Returns the byte offset where the frame text ends and the offset where
/// the remainder begins. Handles `\n\n`, `\n\r\n`, and by extension the
/// fully CRLF-delimited `\r\n\r\n` (the `\r` before the first `\n` stays in
/// the frame text and is stripped during line parsing).
fn find_frame_boundary(buffer: &str) -> Option<(usize, usize)> {
    let bytes = buffer.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let rest = &bytes[i + 1..];
        if rest.starts_with(b"\n") {
            return Some((i, i + 2));
        }
        if rest.starts_with(b"\r\n") {
            return Some((i, i + 3));
        }
    }
    None
}

/// Parse the lines of one frame into an event.
///
/// Lines beginning with `:` are comments. A field line is `name: value`
/// with at most one leading space stripped from the value; `data` lines
/// accumulate, `event` and `id` set their fields, and unrecognized field
/// names are skipped for forward compatibility. A frame that sets no fields
/// at all yields `None`.
fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut saw_field = false;
    let mut event_type: Option<String> = None;
    let mut id: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            // A field name with no colon has an empty value per the SSE
            // grammar.
            None => (line, ""),
        };
        match field {
            "data" => {
                saw_field = true;
                data_lines.push(value);
            }
            "event" => {
                saw_field = true;
                event_type = Some(value.to_string());
            }
            "id" => {
                saw_field = true;
                id = Some(value.to_string());
            }
            _ => {}
        }
    }

    if !saw_field {
        return None;
    }
    Some(SseEvent {
        event: event_type,
        id,
        data: data_lines.join("\n"),
    })
}
