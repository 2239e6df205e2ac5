//! Provider seam and the relay's error taxonomy.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::model::{ConversationMessage, DeltaChunk};

/// Errors that can occur while requesting or relaying a completion.
///
/// `Display` is the exact message the relay returns in its `{ "error": ... }`
/// payload, so configuration failures must keep the words "API key".
#[derive(Error, Debug)]
pub enum ClientError {
    /// Required credential absent or still the placeholder value.
    #[error("{0}")]
    Configuration(String),

    /// Upstream answered without a body or with a non-OK status.
    #[error("{0}")]
    Protocol(String),

    /// One event frame carried malformed JSON.
    #[error("failed to decode event frame: {0}")]
    Decode(#[from] serde_json::Error),

    /// Transport failure, before or during the stream.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Ordered stream of text deltas for a single completion.
pub type DeltaStream = BoxStream<'static, Result<DeltaChunk, ClientError>>;

/// A language-model provider that can stream a chat completion.
///
/// The relay holds one implementation behind an `Arc` for the lifetime of the
/// process; each call owns its provider connection until the returned stream
/// is dropped.
#[async_trait]
pub trait StreamingClient: Send + Sync {
    /// Issue a streamed completion for `messages` (caller history, without
    /// the system prompt).
    ///
    /// Request-level failures are returned here, before any delta is
    /// produced. Failures after that point arrive as stream items.
    async fn request_stream(
        &self,
        messages: Vec<ConversationMessage>,
    ) -> Result<DeltaStream, ClientError>;
}
