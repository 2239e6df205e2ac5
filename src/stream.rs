//! Plain-text re-emission of a delta stream.
//!
//! The relay's callers never see provider framing: each delta becomes exactly
//! one body chunk holding its UTF-8 bytes, nothing more.

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::client::{ClientError, DeltaStream};
use crate::model::DeltaChunk;

pub const PLAIN_TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Re-encode deltas as raw bytes, one output chunk per delta.
pub fn into_text_stream<S>(deltas: S) -> impl Stream<Item = Result<Bytes, ClientError>> + Send
where
    S: Stream<Item = Result<DeltaChunk, ClientError>> + Send,
{
    deltas.map(|delta| {
        delta
            .map(DeltaChunk::into_bytes)
            .inspect_err(|e| tracing::error!(error = %e, "completion stream failed mid-response"))
    })
}

/// Uncached, keep-alive, plain-text streaming response.
pub struct PlainTextResponse {
    deltas: DeltaStream,
}

impl PlainTextResponse {
    pub fn new(deltas: DeltaStream) -> Self {
        Self { deltas }
    }
}

impl IntoResponse for PlainTextResponse {
    fn into_response(self) -> Response {
        let body = Body::from_stream(into_text_stream(self.deltas));

        (
            [
                (CONTENT_TYPE, PLAIN_TEXT_CONTENT_TYPE),
                (CACHE_CONTROL, "no-cache"),
                (CONNECTION, "keep-alive"),
            ],
            body,
        )
            .into_response()
    }
}
