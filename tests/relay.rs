// End-to-end: renderer -> relay (real loopback listener) -> wiremock provider.

use std::sync::Arc;

use serde_json::json;
use smokesignal::options::{HttpTransport, ModelOptions, TransportOptions};
use smokesignal::providers::OpenAiClient;
use smokesignal::renderer::{
    ChatSession, FailureKind, HttpRelay, Outcome, CONFIGURATION_ERROR_COPY, GENERIC_ERROR_COPY,
};
use smokesignal::server::build_router;
use smokesignal::ConversationMessage;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serve the relay on an ephemeral port and return its chat URL.
async fn spawn_relay(api_key: Option<&str>, provider_url: String) -> String {
    let transport = TransportOptions::new(HttpTransport {
        api_key: api_key.map(Into::into),
        base_url: Some(provider_url),
        ..HttpTransport::default()
    });
    let client = OpenAiClient::new(ModelOptions::default(), transport).unwrap();
    let app = build_router(Arc::new(client));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/api/chat", addr)
}

fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": delta } }] })
        ));
    }
    body.push_str("data: {broken\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn test_reply_streams_through_relay() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["Brunch ", "spots ", "nearby"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&provider)
        .await;

    let relay_url = spawn_relay(Some("sk-test"), provider.uri()).await;
    let mut session = ChatSession::new(HttpRelay::new(relay_url));
    let mut frames: Vec<String> = Vec::new();

    let outcome = session
        .submit("any brunch?", vec![], &mut |conversation: &[ConversationMessage]| {
            frames.push(conversation.last().unwrap().content.clone());
        })
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Completed("Brunch spots nearby".to_string()));
    assert_eq!(frames.first().map(String::as_str), Some(""));
    assert_eq!(frames.last().map(String::as_str), Some("Brunch spots nearby"));
    // Content only ever grows while streaming.
    assert!(frames.windows(2).all(|w| w[1].starts_with(w[0].as_str())));
}

#[tokio::test]
async fn test_missing_key_shows_configuration_copy() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;

    let relay_url = spawn_relay(None, provider.uri()).await;
    let mut session = ChatSession::new(HttpRelay::new(relay_url));

    let outcome = session
        .submit("hi", vec![], &mut |_: &[ConversationMessage]| {})
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Failed(FailureKind::Configuration));
    assert_eq!(
        session.conversation().last().unwrap().content,
        CONFIGURATION_ERROR_COPY
    );
}

#[tokio::test]
async fn test_provider_error_shows_generic_copy() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&provider)
        .await;

    let relay_url = spawn_relay(Some("sk-test"), provider.uri()).await;
    let mut session = ChatSession::new(HttpRelay::new(relay_url));

    let outcome = session
        .submit("hi", vec![], &mut |_: &[ConversationMessage]| {})
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Failed(FailureKind::Generic));
    assert_eq!(session.conversation().last().unwrap().content, GENERIC_ERROR_COPY);
}

#[tokio::test]
async fn test_images_select_vision_model() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "model": "gpt-4-vision-preview" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&["A leaf."]), "text/event-stream"),
        )
        .expect(1)
        .mount(&provider)
        .await;

    let relay_url = spawn_relay(Some("sk-test"), provider.uri()).await;
    let mut session = ChatSession::new(HttpRelay::new(relay_url));

    let outcome = session
        .submit(
            "",
            vec!["https://i.example/leaf.png".to_string()],
            &mut |_: &[ConversationMessage]| {},
        )
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Completed("A leaf.".to_string()));
}
