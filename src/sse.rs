//! Server-Sent Events (SSE) frame decoding for chat-completion streams.
//!
//! The provider answers with UTF-8 text split into arbitrary transport chunks.
//! Each chunk holds zero or more `\n`-delimited lines:
//! ```text
//! data: {"choices":[{"delta":{"content":"He"}}]}
//!
//! data: {"choices":[{"delta":{"content":"llo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Lines are reassembled across chunk boundaries before they are decoded, so a
//! frame split by the transport still yields its delta.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::client::ClientError;
use crate::model::DeltaChunk;

/// Line prefix of every actionable frame.
pub const DATA_PREFIX: &str = "data:";

/// Terminal frame. Never forwarded.
pub const DONE_FRAME: &str = "data: [DONE]";

/// Longest line the decoder buffers while waiting for its `\n`.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Extension trait for `reqwest::Response` to decode a completion stream.
pub trait SSEResponseExt {
    /// Convert the response body into a stream of text deltas.
    fn sse_deltas(self) -> impl Stream<Item = Result<DeltaChunk, ClientError>> + Send;
}

impl SSEResponseExt for reqwest::Response {
    fn sse_deltas(self) -> impl Stream<Item = Result<DeltaChunk, ClientError>> + Send {
        delta_stream(self.bytes_stream())
    }
}

/// Decode any byte stream of SSE frames into text deltas.
///
/// Deltas come out in arrival order. Malformed frames are logged and dropped.
/// A transport error is yielded once and ends the stream.
pub fn delta_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<DeltaChunk, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send,
{
    let byte_stream: Pin<Box<S>> = Box::pin(byte_stream);

    stream::unfold(
        (byte_stream, SseDecoder::new(), VecDeque::new(), false),
        |(mut byte_stream, mut decoder, mut ready, mut stream_ended)| async move {
            loop {
                if let Some(chunk) = ready.pop_front() {
                    return Some((Ok(chunk), (byte_stream, decoder, ready, stream_ended)));
                }

                if stream_ended {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => ready.extend(decoder.decode(&bytes)),
                    Some(Err(e)) => {
                        // Nothing after a transport failure is trustworthy.
                        let error: ClientError = e.into();
                        return Some((Err(error), (byte_stream, decoder, ready, true)));
                    }
                    None => {
                        stream_ended = true;
                        ready.extend(decoder.finish());
                    }
                }
            }
        },
    )
}

/// Incremental frame decoder.
///
/// Holds the unterminated tail of the last chunk (and any incomplete UTF-8
/// sequence) until the next chunk completes it. A line longer than
/// [`MAX_LINE_LEN`] is dropped up to its terminator.
#[derive(Debug, Default)]
pub struct SseDecoder {
    text: Utf8Buffer,
    line: String,
    discarding: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk, returning the deltas of every line it completes.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<DeltaChunk> {
        let text = self.text.push(chunk);
        self.line.push_str(&text);

        let mut deltas = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            if self.discarding {
                self.discarding = false;
            } else if let Some(delta) = decode_line(&self.line[..pos]) {
                deltas.push(delta);
            }
            self.line.drain(..=pos);
        }

        if self.line.len() > MAX_LINE_LEN {
            if !self.discarding {
                tracing::warn!(buffered = self.line.len(), "dropping oversized event line");
            }
            self.line.clear();
            self.discarding = true;
        }
        deltas
    }

    /// Flush whatever is buffered once the transport has ended.
    pub fn finish(&mut self) -> Vec<DeltaChunk> {
        let tail = self.text.flush();
        self.line.push_str(&tail);
        let line = std::mem::take(&mut self.line);
        if std::mem::take(&mut self.discarding) {
            return Vec::new();
        }
        decode_line(&line).into_iter().collect()
    }
}

/// Decode one line into a delta, if it carries one.
pub fn decode_line(line: &str) -> Option<DeltaChunk> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if is_done_marker(line) {
        return None;
    }
    let data = parse_sse_line(line)?;

    match serde_json::from_str::<StreamFrame>(data) {
        Ok(frame) => frame.into_delta(),
        Err(e) => {
            tracing::warn!(error = %ClientError::Decode(e), frame = %line, "dropping malformed event frame");
            None
        }
    }
}

/// Parse an SSE line to extract the data portion.
///
/// # Example
/// ```
/// use smokesignal::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"a\":1}"), Some(" {\"a\":1}"));
/// assert_eq!(parse_sse_line("event: ping"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}

/// Check if a line is the stream-end sentinel.
///
/// # Example
/// ```
/// use smokesignal::sse::is_done_marker;
///
/// assert!(is_done_marker("data: [DONE]"));
/// assert!(!is_done_marker("data: {}"));
/// ```
pub fn is_done_marker(line: &str) -> bool {
    line == DONE_FRAME
}

/// UTF-8 decoder that carries incomplete trailing sequences between chunks.
///
/// Invalid bytes are replaced, never dropped silently.
#[derive(Debug, Default)]
pub(crate) struct Utf8Buffer {
    pending: Vec<u8>,
}

impl Utf8Buffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut text = String::new();
        let mut consumed = 0;
        loop {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    text.push_str(&String::from_utf8_lossy(&rest[..e.valid_up_to()]));
                    consumed += e.valid_up_to();
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            consumed += len;
                        }
                        // Incomplete trailing sequence, wait for the next chunk.
                        None => break,
                    }
                }
            }
        }

        self.pending.drain(..consumed);
        text
    }

    pub(crate) fn flush(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl StreamFrame {
    fn into_delta(self) -> Option<DeltaChunk> {
        self.choices
            .into_iter()
            .next()?
            .delta?
            .content
            .filter(|content| !content.is_empty())
            .map(DeltaChunk::new)
    }
}
