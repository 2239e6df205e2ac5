//! OpenAI Chat Completions client.
//!
//! Builds the streamed completion request for a conversation and decodes the
//! answer into text deltas.
//! See: <https://platform.openai.com/docs/api-reference/chat/create>

use async_trait::async_trait;
use futures::StreamExt;
use nonempty::NonEmpty;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::client::{ClientError, DeltaStream, StreamingClient};
use crate::http::{add_extra_headers, build_http_client};
use crate::model::{ConversationMessage, Role};
use crate::options::{ModelOptions, TransportOptions};
use crate::sse::SSEResponseExt;

const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// Message returned when no usable credential is configured.
pub const MISSING_API_KEY: &str =
    "OpenAI API key not configured. Please add a valid API key to your .env.local file.";

/// OpenAI client using HTTP transport.
///
/// Built once at startup and shared by every relayed request.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    model_options: ModelOptions,
    transport_options: TransportOptions,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        model_options: ModelOptions,
        transport_options: TransportOptions,
    ) -> Result<Self, ClientError> {
        let http = build_http_client(&transport_options)?;
        Ok(Self {
            model_options,
            transport_options,
            http,
        })
    }

    fn endpoint(&self) -> String {
        let base = self
            .transport_options
            .provider
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    /// Handle OpenAI error responses.
    fn handle_error_response(status: reqwest::StatusCode, body: &str) -> ClientError {
        match serde_json::from_str::<OpenAiErrorResponse>(body) {
            Ok(error_resp) => ClientError::Protocol(format!(
                "OpenAI error ({}): {}",
                error_resp.error.error_type.as_deref().unwrap_or("unknown"),
                error_resp.error.message
            )),
            Err(_) => ClientError::Protocol(format!("HTTP {}: {}", status, body)),
        }
    }
}

#[async_trait]
impl StreamingClient for OpenAiClient {
    async fn request_stream(
        &self,
        messages: Vec<ConversationMessage>,
    ) -> Result<DeltaStream, ClientError> {
        let api_key = self
            .transport_options
            .provider
            .usable_api_key()
            .ok_or_else(|| ClientError::Configuration(MISSING_API_KEY.to_string()))?;

        let request_body = OpenAiRequest::new(&messages, &self.model_options);
        tracing::info!(
            model = %request_body.model,
            messages = request_body.messages.len(),
            "requesting streamed completion"
        );

        let mut req = self
            .http
            .post(self.endpoint())
            .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
            .header(CONTENT_TYPE, "application/json");

        req = add_extra_headers(req, &self.transport_options.provider.extra_headers);

        let response = req.json(&request_body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::handle_error_response(status, &body));
        }

        if response.content_length() == Some(0) {
            return Err(ClientError::Protocol("No response body from OpenAI".to_string()));
        }

        Ok(response.sse_deltas().boxed())
    }
}

// --- OpenAI API Request Types ---

#[derive(Debug, Clone, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiMessage {
    role: Role,
    content: OpenAiContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(NonEmpty<OpenAiContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiImageUrl {
    url: String,
}

impl OpenAiRequest {
    /// System prompt first, then the caller's history.
    fn new(history: &[ConversationMessage], model_options: &ModelOptions) -> Self {
        let has_images = history.iter().any(ConversationMessage::has_images);
        let system = ConversationMessage::system(model_options.instructions.clone());

        OpenAiRequest {
            model: model_options.select_model(has_images).to_string(),
            messages: std::iter::once(&system)
                .chain(history)
                .map(OpenAiMessage::from)
                .collect(),
            max_tokens: model_options.max_tokens,
            temperature: model_options.temperature,
            stream: true,
        }
    }
}

impl From<&ConversationMessage> for OpenAiMessage {
    fn from(msg: &ConversationMessage) -> Self {
        let text = (!msg.content.is_empty()).then(|| OpenAiContentPart::Text {
            text: msg.content.clone(),
        });
        let images = msg.image_references.iter().map(|url| OpenAiContentPart::ImageUrl {
            image_url: OpenAiImageUrl { url: url.clone() },
        });

        let content = if msg.has_images() {
            NonEmpty::from_vec(text.into_iter().chain(images).collect())
                .map(OpenAiContent::Parts)
                .unwrap_or_default()
        } else {
            OpenAiContent::Text(msg.content.clone())
        };

        OpenAiMessage {
            role: msg.role,
            content,
        }
    }
}

impl Default for OpenAiContent {
    fn default() -> Self {
        OpenAiContent::Text(String::new())
    }
}

// --- OpenAI API Error Types ---

#[derive(Debug, Clone, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiError {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{HttpTransport, PLACEHOLDER_API_KEY};
    use serde_json::{json, Value};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_json(history: &[ConversationMessage]) -> Value {
        serde_json::to_value(OpenAiRequest::new(history, &ModelOptions::default())).unwrap()
    }

    fn client_for(server: &MockServer, api_key: Option<&str>) -> OpenAiClient {
        let provider = HttpTransport {
            api_key: api_key.map(Into::into),
            base_url: Some(server.uri()),
            ..HttpTransport::default()
        };
        OpenAiClient::new(ModelOptions::default(), TransportOptions::new(provider)).unwrap()
    }

    #[test]
    fn test_text_messages_pass_through() {
        let history = vec![
            ConversationMessage::user("hi"),
            ConversationMessage::assistant("hello!"),
            ConversationMessage::user("where to eat?"),
        ];
        let body = request_json(&history);

        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .starts_with("You are a helpful assistant"));
        assert_eq!(body["messages"][1], json!({ "role": "user", "content": "hi" }));
        assert_eq!(body["messages"][2], json!({ "role": "assistant", "content": "hello!" }));
        assert_eq!(body["messages"][3], json!({ "role": "user", "content": "where to eat?" }));
    }

    #[test]
    fn test_image_parts_follow_text_in_order() {
        let history = vec![ConversationMessage::user("what is this?").with_images(["u1", "u2"])];
        let body = request_json(&history);

        assert_eq!(body["model"], "gpt-4-vision-preview");
        assert_eq!(
            body["messages"][1]["content"],
            json!([
                { "type": "text", "text": "what is this?" },
                { "type": "image_url", "image_url": { "url": "u1" } },
                { "type": "image_url", "image_url": { "url": "u2" } },
            ])
        );
    }

    #[test]
    fn test_image_only_message_has_no_text_part() {
        let history = vec![ConversationMessage::user("").with_images(["u1"])];
        let body = request_json(&history);

        assert_eq!(
            body["messages"][1]["content"],
            json!([{ "type": "image_url", "image_url": { "url": "u1" } }])
        );
    }

    #[test]
    fn test_any_image_selects_vision_model() {
        let history = vec![
            ConversationMessage::user("first").with_images(["u1"]),
            ConversationMessage::assistant("a cat"),
            ConversationMessage::user("and now?"),
        ];
        let body = request_json(&history);

        assert_eq!(body["model"], "gpt-4-vision-preview");
        assert_eq!(body["messages"][3]["content"], "and now?");
    }

    #[test]
    fn test_endpoint_ignores_trailing_slash() {
        let provider = HttpTransport::new("k").with_base_url("http://localhost:9/".to_string());
        let client =
            OpenAiClient::new(ModelOptions::default(), TransportOptions::new(provider)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        for key in [None, Some(PLACEHOLDER_API_KEY)] {
            let err = client_for(&server, key)
                .request_stream(vec![ConversationMessage::user("hi")])
                .await
                .err()
                .unwrap();
            assert!(matches!(err, ClientError::Configuration(_)));
            assert!(err.to_string().contains("API key"));
        }
    }

    #[tokio::test]
    async fn test_streams_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "stream": true, "model": "gpt-3.5-turbo" })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let stream = client_for(&server, Some("sk-test"))
            .request_stream(vec![ConversationMessage::user("hi")])
            .await
            .unwrap();
        let deltas: Vec<String> = stream.map(|d| d.unwrap().into()).collect().await;

        assert_eq!(deltas, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn test_extra_headers_reach_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-team", "chat"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("data: [DONE]\n\n", "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpTransport::new("sk-test")
            .with_base_url(server.uri())
            .with_header("x-team".to_string(), "chat".to_string());
        let client =
            OpenAiClient::new(ModelOptions::default(), TransportOptions::new(provider)).unwrap();
        let deltas: Vec<_> = client
            .request_stream(vec![ConversationMessage::user("hi")])
            .await
            .unwrap()
            .collect()
            .await;

        assert!(deltas.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "type": "rate_limit_exceeded", "message": "slow down" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("sk-test"))
            .request_stream(vec![ConversationMessage::user("hi")])
            .await
            .err()
            .unwrap();

        match err {
            ClientError::Protocol(message) => {
                assert_eq!(message, "OpenAI error (rate_limit_exceeded): slow down")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("sk-test"))
            .request_stream(vec![ConversationMessage::user("hi")])
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ClientError::Protocol(ref m) if m.contains("No response body")));
    }
}
