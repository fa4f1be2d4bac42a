//! API-based chat model using OpenAI- or Anthropic-compatible endpoints.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use futures::StreamExt;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use rag_types::{ChatMessage, ChatRole, LlmSettings};

use crate::sse::{SseDecoder, SseEvent};
use crate::{ChatModel, CompletionParams, LlmError, StreamHandler};

/// Wire protocol spoken by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiProvider {
    OpenAi,
    Anthropic,
}

impl ApiProvider {
    /// Parse a provider name from settings.
    pub fn parse(name: &str) -> Result<Self, LlmError> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Ok(ApiProvider::OpenAi),
            "anthropic" | "claude" => Ok(ApiProvider::Anthropic),
            other => Err(LlmError::Config(format!("Unknown provider: {}", other))),
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "https://api.openai.com/v1",
            ApiProvider::Anthropic => "https://api.anthropic.com/v1",
        }
    }
}

/// Configuration for the API chat model.
#[derive(Debug, Clone)]
pub struct ApiChatModelConfig {
    pub provider: ApiProvider,

    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    pub model: String,

    pub api_key: SecretString,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum attempts for non-streaming calls
    pub max_retries: u32,
}

impl ApiChatModelConfig {
    /// Create config for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: ApiProvider::OpenAi,
            base_url: ApiProvider::OpenAi.default_base_url().to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    /// Create config for the Anthropic API.
    pub fn anthropic(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: ApiProvider::Anthropic,
            base_url: ApiProvider::Anthropic.default_base_url().to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    /// Build config from application settings.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let provider = ApiProvider::parse(&settings.provider)?;
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Config("llm.api_key is not set".to_string()))?;

        Ok(Self {
            provider,
            base_url: settings
                .api_base_url
                .clone()
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            model: settings.model.clone(),
            api_key: SecretString::from(api_key),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries.max(1),
        })
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<AnthropicDelta>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct AnthropicDelta {
    text: Option<String>,
}

/// API-based chat model implementation.
pub struct ApiChatModel {
    client: Client,
    config: ApiChatModelConfig,
}

impl ApiChatModel {
    /// Create a new API chat model.
    pub fn new(config: ApiChatModelConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Call the API with retry logic.
    async fn call_api(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, LlmError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, model = %self.config.model, "Calling chat API");

            match self.make_request(messages, params).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempts >= self.config.max_retries || !e.is_unavailable() {
                        error!(error = %e, attempts, "Chat API call failed");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "Chat API call failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn make_request(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, LlmError> {
        let response = self.send(messages, params, false).await?;

        let text = match self.config.provider {
            ApiProvider::OpenAi => {
                let body: OpenAIResponse = response
                    .json()
                    .await
                    .map_err(|e| LlmError::Malformed(e.to_string()))?;
                body.choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| LlmError::Malformed("No choices in response".to_string()))?
                    .message
                    .content
                    .unwrap_or_default()
            }
            ApiProvider::Anthropic => {
                let body: AnthropicResponse = response
                    .json()
                    .await
                    .map_err(|e| LlmError::Malformed(e.to_string()))?;
                if body.content.is_empty() {
                    return Err(LlmError::Malformed("No content in response".to_string()));
                }
                body.content
                    .into_iter()
                    .map(|c| c.text)
                    .collect::<Vec<_>>()
                    .join("")
            }
        };

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    /// Send one request and check the status.
    async fn send(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
        stream: bool,
    ) -> Result<Response, LlmError> {
        let request = match self.config.provider {
            ApiProvider::OpenAi => {
                let body = OpenAIRequest {
                    model: &self.config.model,
                    messages: messages.iter().map(wire_message).collect(),
                    temperature: params.temperature,
                    max_tokens: params.max_tokens,
                    stream,
                };
                self.client
                    .post(format!("{}/chat/completions", self.config.base_url))
                    .header(
                        "Authorization",
                        format!("Bearer {}", self.config.api_key.expose_secret()),
                    )
                    .json(&body)
            }
            ApiProvider::Anthropic => {
                let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
                    messages.iter().partition(|m| m.role == ChatRole::System);
                let system = if system.is_empty() {
                    None
                } else {
                    Some(
                        system
                            .iter()
                            .map(|m| m.content.as_str())
                            .collect::<Vec<_>>()
                            .join("\n\n"),
                    )
                };
                let body = AnthropicRequest {
                    model: &self.config.model,
                    max_tokens: params.max_tokens,
                    temperature: params.temperature,
                    system,
                    messages: rest.into_iter().map(wire_message).collect(),
                    stream,
                };
                self.client
                    .post(format!("{}/messages", self.config.base_url))
                    .header("x-api-key", self.config.api_key.expose_secret())
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
            }
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Unavailable("request timed out".to_string())
            } else {
                LlmError::Unavailable(e.to_string())
            }
        })?;

        if response.status() == 429 {
            return Err(LlmError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Unavailable(format!("HTTP {}: {}", status, body)));
        }

        Ok(response)
    }

    /// Extract the text delta from one stream payload.
    fn parse_stream_payload(&self, data: &str) -> Result<Option<String>, LlmError> {
        match self.config.provider {
            ApiProvider::OpenAi => {
                let chunk: OpenAIStreamChunk = serde_json::from_str(data)
                    .map_err(|e| LlmError::Malformed(format!("stream chunk: {}", e)))?;
                Ok(chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content))
            }
            ApiProvider::Anthropic => {
                let event: AnthropicStreamEvent = serde_json::from_str(data)
                    .map_err(|e| LlmError::Malformed(format!("stream event: {}", e)))?;
                match event.kind.as_str() {
                    "content_block_delta" => Ok(event.delta.and_then(|d| d.text)),
                    "error" => Err(LlmError::Unavailable(
                        event
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "stream error".to_string()),
                    )),
                    _ => Ok(None),
                }
            }
        }
    }

    async fn stream_inner(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
        handler: &mut dyn StreamHandler,
    ) -> Result<String, LlmError> {
        let response = self.send(messages, params, true).await?;
        let mut byte_stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut full_text = String::new();

        'outer: while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Unavailable(e.to_string()))?;
            for event in decoder.push(&chunk) {
                match event {
                    SseEvent::Done => break 'outer,
                    SseEvent::Data(data) => {
                        if let Some(token) = self.parse_stream_payload(&data)? {
                            if !token.is_empty() {
                                handler.on_token(&token);
                                full_text.push_str(&token);
                            }
                        }
                    }
                }
            }
        }

        if full_text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(full_text)
    }
}

fn wire_message(message: &ChatMessage) -> WireMessage<'_> {
    let role = match message.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    WireMessage {
        role,
        content: &message.content,
    }
}

#[async_trait]
impl ChatModel for ApiChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, LlmError> {
        self.call_api(messages, params).await
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
        handler: &mut dyn StreamHandler,
    ) -> Result<String, LlmError> {
        match self.stream_inner(messages, params, handler).await {
            Ok(text) => {
                handler.on_complete(&text);
                Ok(text)
            }
            Err(e) => {
                warn!(error = %e, "Streaming completion failed");
                handler.on_error(&e);
                Err(e)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
