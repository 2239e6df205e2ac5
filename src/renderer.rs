//! Client-side chat session with incremental rendering.
//!
//! A [`ChatSession`] owns one conversation. Each submission appends the user
//! message and an empty assistant placeholder, then replaces the placeholder's
//! content with the accumulated reply after every chunk the relay sends.
//!
//! ```text
//! idle --submit--> streaming --end of stream / error / cancel--> settled
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::model::ConversationMessage;
use crate::sse::Utf8Buffer;

/// Shown when the relay reports a missing provider credential.
pub const CONFIGURATION_ERROR_COPY: &str =
    "It seems the OpenAI API key is not configured. Please add your API key to the .env.local file.";

/// Shown for every other failure.
pub const GENERIC_ERROR_COPY: &str = "Sorry, I encountered an error. Please try again.";

/// Text used when the user sends images without writing anything.
pub const IMAGE_ONLY_PROMPT: &str = "What's in this image?";

/// Marker the relay puts in configuration error messages.
const CONFIGURATION_MARKER: &str = "API key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Settled,
}

/// How a failed request is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Configuration,
    Generic,
}

impl FailureKind {
    pub fn copy(self) -> &'static str {
        match self {
            FailureKind::Configuration => CONFIGURATION_ERROR_COPY,
            FailureKind::Generic => GENERIC_ERROR_COPY,
        }
    }
}

/// Errors from talking to the relay.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("relay reported a configuration error: {0}")]
    Configuration(String),

    #[error("relay answered with HTTP {0}")]
    Status(StatusCode),

    #[error("relay connection failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl RelayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RelayError::Configuration(_) => FailureKind::Configuration,
            RelayError::Status(_) | RelayError::Network(_) => FailureKind::Generic,
        }
    }
}

/// Submissions refused before any request is issued.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubmitError {
    #[error("nothing to send: message is empty and has no attachments")]
    Empty,

    /// A reply is still streaming, or a submission was dropped before it
    /// settled. See [`ChatSession::reset`].
    #[error("a reply is still streaming")]
    Busy,
}

/// Final state of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stream ended normally; holds the full reply.
    Completed(String),
    /// Request or stream failed; the placeholder holds the failure copy.
    Failed(FailureKind),
    /// Stopped by the caller; holds whatever had arrived.
    Cancelled(String),
}

/// Raw reply bytes, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes, RelayError>>;

/// Connection to the relay.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Send the conversation and open the reply stream.
    async fn open(&self, messages: &[ConversationMessage]) -> Result<ByteStream, RelayError>;
}

/// Receives every visible update of the conversation.
pub trait RenderSink {
    fn render(&mut self, conversation: &[ConversationMessage]);
}

impl<F> RenderSink for F
where
    F: FnMut(&[ConversationMessage]),
{
    fn render(&mut self, conversation: &[ConversationMessage]) {
        self(conversation)
    }
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    messages: &'a [ConversationMessage],
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// [`RelayTransport`] over HTTP, posting to the relay's chat endpoint.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpRelay {
    /// `endpoint` is the full chat URL, e.g. `http://127.0.0.1:3000/api/chat`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn open(&self, messages: &[ConversationMessage]) -> Result<ByteStream, RelayError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&ChatRequestBody { messages })
            .send()
            .await?;
        let status = response.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let body = response.json::<ErrorBody>().await?;
            return Err(match body.error {
                Some(message) if message.contains(CONFIGURATION_MARKER) => {
                    RelayError::Configuration(message)
                }
                _ => RelayError::Status(status),
            });
        }

        if !status.is_success() {
            return Err(RelayError::Status(status));
        }

        Ok(response.bytes_stream().map_err(RelayError::from).boxed())
    }
}

/// One chat conversation and its streaming state.
pub struct ChatSession<T> {
    transport: T,
    conversation: Vec<ConversationMessage>,
    state: SessionState,
}

impl<T: RelayTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            conversation: Vec::new(),
            state: SessionState::Idle,
        }
    }

    pub fn conversation(&self) -> &[ConversationMessage] {
        &self.conversation
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Settle a submission whose future was dropped mid-stream.
    ///
    /// The placeholder keeps whatever had arrived, as after a cancel. No-op
    /// unless the session is stuck in [`SessionState::Streaming`].
    pub fn reset(&mut self) {
        if self.state == SessionState::Streaming {
            tracing::debug!("settling interrupted reply");
            self.state = SessionState::Settled;
        }
    }

    /// Submit user input and stream the reply to completion.
    pub async fn submit(
        &mut self,
        text: &str,
        image_urls: Vec<String>,
        sink: &mut impl RenderSink,
    ) -> Result<Outcome, SubmitError> {
        self.submit_with_cancel(text, image_urls, sink, &CancellationToken::new())
            .await
    }

    /// Like [`submit`](Self::submit), stopping early once `cancel` fires.
    ///
    /// Cancelling drops the relay connection; the placeholder keeps what had
    /// already arrived.
    pub async fn submit_with_cancel(
        &mut self,
        text: &str,
        image_urls: Vec<String>,
        sink: &mut impl RenderSink,
        cancel: &CancellationToken,
    ) -> Result<Outcome, SubmitError> {
        if self.state == SessionState::Streaming {
            return Err(SubmitError::Busy);
        }
        let text = text.trim();
        if text.is_empty() && image_urls.is_empty() {
            return Err(SubmitError::Empty);
        }

        let content = if text.is_empty() {
            IMAGE_ONLY_PROMPT
        } else {
            text
        };
        self.conversation
            .push(ConversationMessage::user(content).with_images(image_urls));
        self.conversation.push(ConversationMessage::assistant(""));
        self.state = SessionState::Streaming;
        sink.render(&self.conversation);

        let outcome = self.stream_reply(sink, cancel).await;
        if let Outcome::Failed(kind) = outcome {
            self.set_reply(kind.copy().to_string());
        }
        self.state = SessionState::Settled;
        sink.render(&self.conversation);

        Ok(outcome)
    }

    async fn stream_reply(
        &mut self,
        sink: &mut impl RenderSink,
        cancel: &CancellationToken,
    ) -> Outcome {
        // History sent to the relay excludes the empty placeholder.
        let history = &self.conversation[..self.conversation.len() - 1];

        let opened = tokio::select! {
            _ = cancel.cancelled() => return Outcome::Cancelled(String::new()),
            opened = self.transport.open(history) => opened,
        };
        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!(error = %e, "chat request failed");
                return Outcome::Failed(e.kind());
            }
        };

        let mut utf8 = Utf8Buffer::default();
        let mut accumulated = String::new();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(received = accumulated.len(), "reply cancelled");
                    return Outcome::Cancelled(accumulated);
                }
                next = chunks.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    accumulated.push_str(&utf8.push(&bytes));
                    self.set_reply(accumulated.clone());
                    sink.render(&self.conversation);
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "reply stream failed");
                    return Outcome::Failed(e.kind());
                }
                None => {
                    let tail = utf8.flush();
                    if !tail.is_empty() {
                        accumulated.push_str(&tail);
                        self.set_reply(accumulated.clone());
                        sink.render(&self.conversation);
                    }
                    return Outcome::Completed(accumulated);
                }
            }
        }
    }

    /// Replace the content of the trailing assistant placeholder.
    fn set_reply(&mut self, content: String) {
        if let Some(placeholder) = self.conversation.last_mut() {
            placeholder.content = content;
        }
    }
}
