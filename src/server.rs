//! HTTP relay: accepts a conversation, streams the completion back as plain text.
//!
//! Routes:
//! - `POST /api/chat`: `{ "messages": [...] }` in, raw assistant text out
//! - `GET /api/health`: liveness

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use itertools::{Either, Itertools};
use serde::Deserialize;
use serde_json::json;

use crate::client::{ClientError, StreamingClient};
use crate::model::{ConversationMessage, MessageError, Role};
use crate::stream::PlainTextResponse;

/// Shared handler state. Holds the provider client built at startup.
#[derive(Clone)]
pub struct AppState {
    client: Arc<dyn StreamingClient>,
}

pub fn build_router(client: Arc<dyn StreamingClient>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/health", get(health))
        .with_state(AppState { client })
}

/// Every request-level failure is a 500 with `{ "error": message }`.
impl IntoResponse for ClientError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "chat request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
}

/// A message as the browser sends it. Images arrive either as `image_urls`
/// or as typed `attachments`.
///
/// Fields are loose so that one bad record is skipped instead of failing the
/// whole request. A missing or blank role means `user`.
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: String,
}

impl IncomingMessage {
    fn image_references(&self) -> Vec<String> {
        match &self.image_urls {
            Some(urls) => urls.clone(),
            None => self
                .attachments
                .iter()
                .flatten()
                .filter(|a| a.kind == "image" && !a.url.is_empty())
                .map(|a| a.url.clone())
                .collect(),
        }
    }
}

impl TryFrom<IncomingMessage> for ConversationMessage {
    type Error = MessageError;

    fn try_from(incoming: IncomingMessage) -> Result<Self, Self::Error> {
        let role = match incoming.role.as_deref().map(str::trim) {
            None | Some("") => Role::default(),
            Some(name) => name.parse()?,
        };
        let images = incoming.image_references();
        let message = ConversationMessage::new(role, incoming.content.unwrap_or_default())
            .with_images(images);
        message.validate()?;
        Ok(message)
    }
}

// --- Handlers ---

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<PlainTextResponse, ClientError> {
    let (messages, rejected): (Vec<ConversationMessage>, Vec<MessageError>) = request
        .messages
        .into_iter()
        .partition_map(|incoming| match ConversationMessage::try_from(incoming) {
            Ok(message) => Either::Left(message),
            Err(e) => Either::Right(e),
        });

    if !rejected.is_empty() {
        tracing::warn!(
            skipped = rejected.len(),
            reasons = %rejected.iter().join("; "),
            "skipping invalid messages"
        );
    }
    tracing::debug!(messages = messages.len(), "relaying conversation");

    let deltas = state.client.request_stream(messages).await?;
    Ok(PlainTextResponse::new(deltas))
}

async fn health() -> &'static str {
    "ok"
}
