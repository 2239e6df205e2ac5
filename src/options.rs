//! Model and transport options for the completion requester.

use std::collections::HashMap;
use std::time::Duration;

/// Placeholder shipped in sample environment files. Treated as "no key".
pub const PLACEHOLDER_API_KEY: &str = "your-openai-api-key";

pub const DEFAULT_TEXT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4-vision-preview";
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant that provides information about cannabis, \
cannabis-friendly restaurants, events, and other 420-related topics. \
Be respectful, informative, and concise. If you don't know the answer to something specific, be honest about it. \
If images are shared, analyze them and provide relevant information based on what you see.";

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Whether this secret can actually authenticate a request.
    pub fn is_usable(&self) -> bool {
        let value = self.0.trim();
        !value.is_empty() && value != PLACEHOLDER_API_KEY
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Fixed model behaviour applied to every relayed conversation.
///
/// # Example
/// ```rust
/// use smokesignal::options::ModelOptions;
///
/// let options = ModelOptions::default()
///     .with_text_model("gpt-4o-mini".to_string())
///     .with_max_tokens(256);
/// assert_eq!(options.select_model(false), "gpt-4o-mini");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    /// Model used when no message carries an image
    pub text_model: String,

    /// Model used as soon as any message carries an image
    pub vision_model: String,

    /// System prompt, always sent as the first message
    pub instructions: String,

    /// Temperature for sampling (0.0 - 2.0)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ModelOptions {
    pub fn with_text_model(mut self, model: String) -> Self {
        self.text_model = model;
        self
    }

    pub fn with_vision_model(mut self, model: String) -> Self {
        self.vision_model = model;
        self
    }

    pub fn with_instructions(mut self, instructions: String) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Pick the model for a conversation.
    pub fn select_model(&self, has_images: bool) -> &str {
        if has_images {
            &self.vision_model
        } else {
            &self.text_model
        }
    }
}

/// Transport configuration for the provider connection.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Whole-request timeout. `None` waits for the transport to give up.
    pub timeout: Option<Duration>,

    /// HTTP specifics
    pub provider: HttpTransport,
}

impl TransportOptions {
    pub fn new(provider: HttpTransport) -> Self {
        Self {
            timeout: None,
            provider,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP-specific transport options.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    /// API key for authentication
    pub api_key: Option<SecretString>,

    /// Base URL for API endpoints
    pub base_url: Option<String>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl HttpTransport {
    /// Create new HTTP transport options with an API key.
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// The configured key, if it is one that could authenticate.
    pub fn usable_api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref().filter(|key| key.is_usable())
    }
}
