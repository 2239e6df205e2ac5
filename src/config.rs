//! Process configuration for the relay.
//!
//! Parsed once at startup from flags and environment, then turned into the
//! option structs handed to the provider client.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::options::{
    HttpTransport, ModelOptions, SecretString, TransportOptions, DEFAULT_INSTRUCTIONS,
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TEXT_MODEL, DEFAULT_VISION_MODEL,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "smokesignal", about = "Streaming chat relay")]
pub struct RelayConfig {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "SMOKESIGNAL_HOST")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 3000, env = "SMOKESIGNAL_PORT")]
    pub port: u16,

    /// Provider API key. Requests fail with a configuration error while unset.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Provider base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,

    /// Model for text-only conversations
    #[arg(long, default_value = DEFAULT_TEXT_MODEL, env = "SMOKESIGNAL_TEXT_MODEL")]
    pub text_model: String,

    /// Model for conversations that include images
    #[arg(long, default_value = DEFAULT_VISION_MODEL, env = "SMOKESIGNAL_VISION_MODEL")]
    pub vision_model: String,

    /// Token budget per completion
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS, env = "SMOKESIGNAL_MAX_TOKENS")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE, env = "SMOKESIGNAL_TEMPERATURE")]
    pub temperature: f32,

    /// Override the system prompt
    #[arg(long, env = "SMOKESIGNAL_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Provider request timeout in seconds; unset waits on the transport
    #[arg(long, env = "SMOKESIGNAL_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Proxy URL for provider requests
    #[arg(long, env = "SMOKESIGNAL_PROXY")]
    pub proxy: Option<String>,

    /// Extra `name=value` header sent to the provider. Repeatable.
    #[arg(
        long = "header",
        env = "SMOKESIGNAL_EXTRA_HEADERS",
        value_delimiter = ',',
        value_parser = parse_header
    )]
    pub extra_headers: Vec<(String, String)>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected name=value, got `{raw}`")),
    }
}

impl RelayConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions::default()
            .with_text_model(self.text_model.clone())
            .with_vision_model(self.vision_model.clone())
            .with_instructions(
                self.system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
            )
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }

    pub fn transport_options(&self) -> TransportOptions {
        let provider = HttpTransport {
            api_key: self.api_key.clone().map(SecretString::new),
            base_url: self.base_url.clone(),
            proxy: self.proxy.clone(),
            ..HttpTransport::default()
        };
        let provider = self
            .extra_headers
            .iter()
            .cloned()
            .fold(provider, |transport, (name, value)| transport.with_header(name, value));

        let options = TransportOptions::new(provider);
        match self.timeout_secs {
            Some(secs) => options.with_timeout(Duration::from_secs(secs)),
            None => options,
        }
    }
}
