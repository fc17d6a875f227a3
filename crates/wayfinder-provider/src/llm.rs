//! General-conversation responders.
//!
//! [`RuleResponder`] answers from fixed rules and never touches the network.
//! [`OpenAiResponder`] calls the OpenAI chat completions API and
//! [`AnthropicResponder`] the Anthropic Messages API.

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wayfinder_core::config::{LlmConfig, LlmProvider};
use wayfinder_core::{Capability, LocationPoint};

use crate::error::UpstreamError;

/// Trait for anything that can answer a general (non-maps) query.
#[async_trait]
pub trait Responder: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a reply for `prompt`. `context` is the user's stored context.
    async fn respond(&self, prompt: &str, context: &Map<String, Value>)
        -> Result<String, UpstreamError>;
}

/// Pick the responder described by the configuration.
///
/// Falls back to [`RuleResponder`] when the LLM is disabled, has no key, or
/// the HTTP client cannot be built.
pub fn responder_from_config(config: &LlmConfig) -> Arc<dyn Responder> {
    if !config.enabled || config.api_key.trim().is_empty() {
        tracing::info!("LLM responder disabled, using rule-based replies");
        return Arc::new(RuleResponder);
    }
    let responder: Result<Arc<dyn Responder>, UpstreamError> = match config.provider {
        LlmProvider::OpenAi => OpenAiResponder::new(config).map(|r| Arc::new(r) as _),
        LlmProvider::Anthropic => AnthropicResponder::new(config).map(|r| Arc::new(r) as _),
    };
    match responder {
        Ok(responder) => {
            tracing::info!(
                provider = %config.provider,
                model = %config.effective_model(),
                "LLM responder enabled"
            );
            responder
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM responder unavailable, using rule-based replies");
            Arc::new(RuleResponder)
        }
    }
}

// =============================================================================
// Rule-based responder
// =============================================================================

static WEATHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(weather|temperature|rain|sunny|cloudy|forecast)\b").unwrap()
});
static TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(time|clock|hour|minute)\b").unwrap());
static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(hello|hi|hey|greetings|good (morning|afternoon|evening))\b").unwrap()
});
static HELP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(help|what can you do|capabilities)\b").unwrap()
});

/// Fixed replies for greetings, help, weather and time questions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleResponder;

impl RuleResponder {
    fn greeting() -> String {
        let mut reply = String::from("Hello! I'm your maps assistant. I can help you with:\n");
        for cap in Capability::all().iter().filter(|c| **c != Capability::General) {
            reply.push_str(&format!("- {}\n", cap.description()));
        }
        reply.push_str("\nWhat would you like to do?");
        reply
    }

    fn help() -> String {
        let mut reply = String::from(
            "I'm a maps assistant for location-based questions. Try asking:\n",
        );
        for cap in Capability::all().iter().filter(|c| **c != Capability::General) {
            reply.push_str(&format!("- {}: \"{}\"\n", cap.description(), cap.example()));
        }
        reply.push_str("\nJust ask me anything location-related!");
        reply
    }

    /// Synchronous core of [`Responder::respond`].
    pub fn reply_to(&self, prompt: &str) -> String {
        if WEATHER.is_match(prompt) {
            return "I can help with location-based queries, but I don't have access to \
                    real-time weather data. You might want to check a weather service for \
                    current conditions."
                .to_string();
        }
        if TIME.is_match(prompt) {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            return format!(
                "The current time is {now}. I can help you find places or get directions \
                 if you need to plan your schedule!"
            );
        }
        if GREETING.is_match(prompt) {
            return Self::greeting();
        }
        if HELP.is_match(prompt) {
            return Self::help();
        }
        "I'm specialized in location-based queries. I can help you search for places, get \
         directions, find coordinates, or generate map images. Could you rephrase your \
         question in a location-related context?"
            .to_string()
    }
}

#[async_trait]
impl Responder for RuleResponder {
    fn name(&self) -> &str {
        "rules"
    }

    async fn respond(
        &self,
        prompt: &str,
        _context: &Map<String, Value>,
    ) -> Result<String, UpstreamError> {
        Ok(self.reply_to(prompt))
    }
}

// =============================================================================
// Shared HTTP plumbing
// =============================================================================

const SYSTEM_PROMPT: &str = "You are a concise, friendly maps assistant. You can search for \
places, give directions, geocode addresses, reverse geocode coordinates, compute travel time \
matrices and produce map images. For questions outside that scope, answer briefly and steer the \
user back to location-related help. Never invent live data such as weather or traffic.";

/// System prompt, extended with what we know about the user.
fn system_prompt(context: &Map<String, Value>) -> String {
    let mut prompt = SYSTEM_PROMPT.to_string();
    if let Some(location) = context.get("current_location").and_then(LocationPoint::from_json) {
        prompt.push_str(&format!("\nThe user's current location is {location}."));
    }
    if let Some(Value::Object(prefs)) = context.get("preferences") {
        if !prefs.is_empty() {
            prompt.push_str(&format!(
                "\nThe user's stated preferences: {}.",
                Value::Object(prefs.clone())
            ));
        }
    }
    prompt
}

/// Base URL (which may carry a path prefix) plus path segments.
fn api_endpoint(base_url: &str, segments: &[&str]) -> Result<Url, UpstreamError> {
    let mut url = Url::parse(base_url.trim()).map_err(|e| {
        tracing::error!(error = %e, "Invalid LLM base URL");
        UpstreamError::not_configured("language model")
    })?;
    url.path_segments_mut()
        .map_err(|_| UpstreamError::not_configured("language model"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn http_client(config: &LlmConfig) -> Result<Client, UpstreamError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()?)
}

/// Send a JSON request and decode a 2xx body.
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, UpstreamError> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            status = status.as_u16(),
            body = %body.chars().take(200).collect::<String>(),
            "LLM upstream returned error status"
        );
        return Err(UpstreamError::status(status.as_u16()));
    }
    Ok(response.json().await?)
}

fn require_key(config: &LlmConfig) -> Result<String, UpstreamError> {
    match config.api_key.trim() {
        "" => Err(UpstreamError::not_configured("language model")),
        key => Ok(key.to_string()),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl WireMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

// =============================================================================
// OpenAI responder
// =============================================================================

/// Client for the OpenAI chat completions API.
#[derive(Clone)]
pub struct OpenAiResponder {
    http: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl fmt::Debug for OpenAiResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiResponder")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiResponder {
    pub fn new(config: &LlmConfig) -> Result<Self, UpstreamError> {
        let api_key = require_key(config)?;
        let endpoint =
            api_endpoint(config.effective_base_url(), &["v1", "chat", "completions"])?;
        Ok(Self {
            http: http_client(config)?,
            endpoint,
            api_key,
            model: config.effective_model().to_string(),
            max_tokens: config.max_tokens,
        })
    }

    fn build_request(&self, prompt: &str, context: &Map<String, Value>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![
                WireMessage::new("system", system_prompt(context)),
                WireMessage::new("user", prompt),
            ],
        }
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn respond(
        &self,
        prompt: &str,
        context: &Map<String, Value>,
    ) -> Result<String, UpstreamError> {
        let request = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&self.build_request(prompt, context));
        extract_completion(send_json(request).await?)
    }
}

fn extract_completion(response: ChatCompletionResponse) -> Result<String, UpstreamError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        tracing::warn!("LLM response contained no completion text");
        return Err(UpstreamError::malformed());
    }
    Ok(text)
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

// =============================================================================
// Anthropic responder
// =============================================================================

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicResponder {
    http: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl fmt::Debug for AnthropicResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicResponder")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl AnthropicResponder {
    pub fn new(config: &LlmConfig) -> Result<Self, UpstreamError> {
        let api_key = require_key(config)?;
        let endpoint = api_endpoint(config.effective_base_url(), &["v1", "messages"])?;
        Ok(Self {
            http: http_client(config)?,
            endpoint,
            api_key,
            model: config.effective_model().to_string(),
            max_tokens: config.max_tokens,
        })
    }

    fn build_request(&self, prompt: &str, context: &Map<String, Value>) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system_prompt(context),
            messages: vec![WireMessage::new("user", prompt)],
        }
    }
}

#[async_trait]
impl Responder for AnthropicResponder {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn respond(
        &self,
        prompt: &str,
        context: &Map<String, Value>,
    ) -> Result<String, UpstreamError> {
        let request = self
            .http
            .post(self.endpoint.clone())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_request(prompt, context));
        extract_text(send_json(request).await?)
    }
}

fn extract_text(response: MessagesResponse) -> Result<String, UpstreamError> {
    let text: Vec<String> = response
        .content
        .into_iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text)
        .collect();
    let joined = text.join("\n").trim().to_string();
    if joined.is_empty() {
        tracing::warn!("LLM response contained no text blocks");
        return Err(UpstreamError::malformed());
    }
    Ok(joined)
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
