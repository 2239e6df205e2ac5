//! # smokesignal - streaming chat relay
//!
//! A small relay that forwards a chat conversation to an OpenAI-compatible
//! provider and streams the reply back to the browser as plain text, plus the
//! client session that renders that stream incrementally.
//!
//! ## Pipeline
//!
//! ```text
//! ChatSession --POST /api/chat--> server --> OpenAiClient --SSE--> sse
//!      ^                                                            |
//!      +------------- text/plain body <-- stream (re-emitter) <-----+
//! ```
//!
//! - [`providers::OpenAiClient`] builds the completion request (system prompt,
//!   history, image parts, model selection) and opens the provider stream.
//! - [`sse`] turns provider bytes into [`DeltaChunk`]s, dropping malformed frames.
//! - [`stream`] writes each delta verbatim to the outbound body.
//! - [`renderer::ChatSession`] reads that body and re-renders the growing reply.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use smokesignal::options::{HttpTransport, ModelOptions, TransportOptions};
//! use smokesignal::providers::OpenAiClient;
//! use smokesignal::server::build_router;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenAiClient::new(
//!         ModelOptions::default(),
//!         TransportOptions::new(HttpTransport::new("sk-...")),
//!     )?;
//!     let app = build_router(Arc::new(client));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod http;
pub mod model;
pub mod options;
pub mod providers;
pub mod renderer;
pub mod server;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use client::{ClientError, DeltaStream, StreamingClient};
pub use model::{ConversationMessage, DeltaChunk, Role};
pub use renderer::{ChatSession, HttpRelay, Outcome};
