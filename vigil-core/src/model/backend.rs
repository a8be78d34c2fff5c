//! Backend abstraction for chat-completion APIs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::conversation::Role;
use crate::{Error, Result};

/// Default OpenAI chat-completions endpoint
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Maximum length of response bodies quoted in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// A single `{role, content}` entry sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A chat-completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Ask the API to respond with a JSON object
    pub json_response: bool,
}

impl ChatRequest {
    /// Serialize into the OpenAI-compatible wire body
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": self.messages,
            "temperature": self.temperature,
        });
        if self.json_response {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

/// Trait for chat-completion backends
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Get the name of this backend
    fn name(&self) -> &'static str;

    /// Whether a credential is available
    fn is_configured(&self) -> bool;

    /// Send a request and return the first choice's message content
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's content from a raw response body
pub fn extract_content(body: &str) -> Result<String> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("unexpected response shape: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::Parse("response contained no message content".to_string()))
}

/// Map an HTTP error status onto the error taxonomy
///
/// Rate limits, timeouts and server errors are transient; everything else is
/// permanent.
pub fn classify_status(status: u16, body: &str) -> Error {
    let detail = truncate(body, MAX_ERROR_CONTENT_LEN);
    match status {
        401 => Error::permanent(format!("invalid API key (401): {}", detail)),
        403 => Error::permanent(format!("access denied (403): {}", detail)),
        404 => Error::permanent(format!("model or endpoint not found (404): {}", detail)),
        408 => Error::transient(format!("request timeout (408): {}", detail)),
        429 => Error::transient(format!("rate limited (429): {}", detail)),
        500..=599 => Error::transient(format!("server error ({}): {}", status, detail)),
        _ => Error::permanent(format!("request failed ({}): {}", status, detail)),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// OpenAI-compatible HTTP backend
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpBackend {
    /// Create a backend from model configuration and an optional API key
    pub fn new(config: &ModelConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("endpoint", &self.endpoint)
            .field("configured", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let api_key = self.api_key.as_ref().ok_or(Error::NotConfigured)?;

        debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request.to_body())
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transient(format!("failed to read response: {}", e)))?;

        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body));
        }

        extract_content(&body)
    }
}

/// Only timeouts and failed connections are retried
fn classify_send_error(e: &reqwest::Error) -> Error {
    let message = format!("request failed: {}", e);
    if e.is_timeout() || e.is_connect() {
        Error::transient(message)
    } else {
        Error::permanent(message)
    }
}
