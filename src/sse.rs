//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module turns the raw byte stream of a streaming `chat/completions`
//! response into parsed [`ChatCompletionChunk`]s.  Events are separated by a
//! blank line; only `data:` fields matter, and `data: [DONE]` ends the stream.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

/// Sentinel payload that terminates an OpenAI-style stream.
const DONE: &str = "[DONE]";

/// What one complete event in the buffer turned out to be.
enum Event {
    Chunk(Result<ChatCompletionChunk>),
    Done,
    /// Comments, keep-alives and events without data.
    Ignored,
}

/// Process a stream of bytes into a stream of completion chunks.
///
/// Bytes are buffered until a whole event is available, so multi-byte
/// characters and events split across network reads decode correctly.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    let stream = byte_stream.map(|result| {
        result.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("Stream timed out: {e}"), None)
            } else {
                Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
            }
        })
    });
    process_events(stream)
}

/// [`process_sse`] over an already-mapped byte stream.
pub(crate) fn process_events<S>(stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    stream::unfold(
        (stream, Vec::<u8>::new(), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some((event, rest)) = split_event(&buffer) {
                    let event = parse_event(event);
                    buffer.drain(..rest);
                    match event {
                        Event::Chunk(chunk) => return Some((chunk, (stream, buffer, false))),
                        Event::Done => return None,
                        Event::Ignored => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, true))),
                    None => {
                        // A final event may lack its trailing blank line.
                        let trailing = std::mem::take(&mut buffer);
                        return match parse_event(&trailing) {
                            Event::Chunk(chunk) => Some((chunk, (stream, buffer, true))),
                            Event::Done | Event::Ignored => None,
                        };
                    }
                }
            }
        },
    )
}

/// Finds the first complete event: its bytes and where the rest begins.
fn split_event(buffer: &[u8]) -> Option<(&[u8], usize)> {
    for i in 0..buffer.len() {
        let tail = &buffer[i..];
        if tail.starts_with(b"\n\n") {
            return Some((&buffer[..i], i + 2));
        }
        if tail.starts_with(b"\r\n\r\n") {
            return Some((&buffer[..i], i + 4));
        }
    }
    None
}

fn parse_event(raw: &[u8]) -> Event {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            return Event::Chunk(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut data: Option<String> = None;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        let Some(value) = line.strip_prefix("data:") else {
            // `event:`, `id:`, `retry:` and `:` comments carry nothing we use.
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match &mut data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    match data {
        None => Event::Ignored,
        Some(data) if data.trim() == DONE => Event::Done,
        Some(data) if data.trim().is_empty() => Event::Ignored,
        Some(data) => Event::Chunk(parse_chunk(&data)),
    }
}

fn parse_chunk(data: &str) -> Result<ChatCompletionChunk> {
    let value: Value = serde_json::from_str(data)?;
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        let error_type = error
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);
        let status = error
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(500);
        return Err(Error::api(status, error_type, message));
    }
    Ok(serde_json::from_value(value)?)
}
