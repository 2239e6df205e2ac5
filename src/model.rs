//! Conversation and streaming data models shared by the relay and the renderer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of the message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
}

impl std::str::FromStr for Role {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(MessageError::UnknownRole(other.to_string())),
        }
    }
}

/// Reasons a message is refused before it is sent anywhere.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("{role:?} message has neither content nor image references")]
    Empty { role: Role },

    #[error("unknown role `{0}`")]
    UnknownRole(String),
}

/// A single message in a conversation.
///
/// Serializes to the relay's wire shape:
/// `{ "role": "user", "content": "...", "image_urls": [...] }`, where
/// `image_urls` is omitted when there are no image references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(rename = "image_urls", default, skip_serializing_if = "Vec::is_empty")]
    pub image_references: Vec<String>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image_references: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach image references, keeping their order.
    pub fn with_images<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_references.extend(urls.into_iter().map(Into::into));
        self
    }

    pub fn has_images(&self) -> bool {
        !self.image_references.is_empty()
    }

    /// Content may only be empty when the message carries images.
    ///
    /// The renderer's assistant placeholder is exempt: it is never sent
    /// before it has been filled.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.content.is_empty() && !self.has_images() {
            return Err(MessageError::Empty { role: self.role });
        }
        Ok(())
    }
}

/// A fragment of assistant text extracted from one provider event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaChunk(String);

impl DeltaChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Re-encode as the raw bytes written to the relay's outbound stream.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.0)
    }
}

impl From<DeltaChunk> for String {
    fn from(chunk: DeltaChunk) -> Self {
        chunk.0
    }
}
