use std::sync::Arc;

use clap::Parser;
use smokesignal::config::RelayConfig;
use smokesignal::providers::OpenAiClient;
use smokesignal::server::build_router;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smokesignal=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = RelayConfig::parse();
    let transport_options = config.transport_options();
    if transport_options.provider.usable_api_key().is_none() {
        tracing::warn!("no usable OPENAI_API_KEY; chat requests will fail with a configuration error");
    }

    let model_options = config.model_options();
    tracing::info!(
        text_model = %model_options.text_model,
        vision_model = %model_options.vision_model,
        max_tokens = model_options.max_tokens,
        "config loaded"
    );

    let client = OpenAiClient::new(model_options, transport_options)?;
    let app = build_router(Arc::new(client));

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "smokesignal listening");

    axum::serve(listener, app).await?;
    Ok(())
}
