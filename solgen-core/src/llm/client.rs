//! LLM client trait and provider implementations.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

use super::types::{
    ChatRole, CompletionRequest, CompletionResponse, Provider, StopReason, TokenUsage,
};

/// LLM client trait for making completions.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Complete a conversation.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the provider for this client.
    fn provider(&self) -> Provider;
}

/// Configuration for LLM clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Provider to talk to
    pub provider: Provider,
    /// API key
    pub api_key: String,
    /// Base URL override
    pub base_url: Option<String>,
    /// Default model
    pub default_model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Default max tokens per completion
    pub max_tokens: u32,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            provider: Provider::Anthropic,
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
            timeout_secs: 120,
            max_tokens: 8192,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// `LLM_PROVIDER` selects the provider; the key is read from `LLM_API_KEY`
    /// or the provider-specific variable.
    pub fn from_env() -> Result<Self> {
        let provider = match std::env::var("LLM_PROVIDER") {
            Ok(name) => Provider::parse(&name)
                .ok_or_else(|| Error::Config(format!("unsupported LLM_PROVIDER '{}'", name)))?,
            Err(_) => Provider::Anthropic,
        };

        let provider_key = match provider {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        };
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var(provider_key))
            .map_err(|_| {
                Error::Config(format!("set LLM_API_KEY or {} for {}", provider_key, provider))
            })?;

        let mut config = Self::new(api_key).with_provider(provider);
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config = config.with_default_model(model);
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config = config.with_base_url(url);
        }
        if let Some(secs) = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config = config.with_timeout(secs);
        }
        Ok(config)
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Build the client for the configured provider.
pub fn client_from_config(config: ClientConfig) -> Result<Arc<dyn LLMClient>> {
    Ok(match config.provider {
        Provider::Anthropic => Arc::new(AnthropicClient::new(config)?),
        Provider::OpenAI | Provider::OpenRouter => Arc::new(OpenAIClient::new(config)?),
    })
}

fn build_http_client(timeout_secs: u64) -> Result<Client> {
    let timeout = Duration::from_secs(timeout_secs);

    // Proxy auto-detection can panic in restricted sandboxes; retry without it.
    match catch_unwind(AssertUnwindSafe(|| {
        Client::builder().timeout(timeout).build()
    })) {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e))),
    }
}

/// Map a transport failure to the pipeline error taxonomy.
fn transport_error(err: reqwest::Error, timeout_secs: u64) -> Error {
    if err.is_timeout() {
        Error::timeout(timeout_secs * 1000)
    } else {
        Error::LLM(format!("HTTP request failed: {}", err))
    }
}

/// Map a non-success HTTP status to the pipeline error taxonomy.
fn status_error(provider: Provider, status: StatusCode, message: String) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Error::RateLimited(format!("{} ({}): {}", provider, status, message))
    } else {
        Error::llm_api(provider.to_string(), format!("({}): {}", status, message))
    }
}

/// Anthropic Claude client.
pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";
    const DEFAULT_MODEL: &'static str = "claude-3-5-sonnet-20241022";

    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = build_http_client(config.timeout_secs)?;

        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .clone()
            .or(self.config.default_model.clone())
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());

        let messages: Vec<AnthropicMessage> = request
            .conversation()
            .map(|m| AnthropicMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        let api_request = AnthropicRequest {
            model: model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            system: request.system_prompt(),
            temperature: request.temperature,
        };

        let url = format!("{}/v1/messages", self.base_url());

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.config.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.config.timeout_secs))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<AnthropicError>(&body) {
                Ok(error) => format!("{}: {}", error.error.error_type, error.error.message),
                Err(_) => body,
            };
            return Err(status_error(Provider::Anthropic, status, message));
        }

        let api_response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        let content = api_response
            .content
            .iter()
            .filter_map(|c| c.text.as_ref())
            .cloned()
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(Error::MalformedResponse(
                "response missing assistant content".to_string(),
            ));
        }

        let stop_reason = api_response.stop_reason.as_deref().map(|r| match r {
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        });

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content,
            stop_reason,
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
            timestamp: Utc::now(),
        })
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}

/// OpenAI chat-completions client.
///
/// Also serves OpenRouter and other OpenAI-compatible endpoints through the
/// base URL override.
pub struct OpenAIClient {
    config: ClientConfig,
    http: Client,
}

impl OpenAIClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    const OPENROUTER_BASE_URL: &'static str = "https://openrouter.ai/api/v1";
    const DEFAULT_MODEL: &'static str = "gpt-4o";

    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = build_http_client(config.timeout_secs)?;

        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        let default = match self.config.provider {
            Provider::OpenRouter => Self::OPENROUTER_BASE_URL,
            _ => Self::DEFAULT_BASE_URL,
        };
        self.config
            .base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .clone()
            .or(self.config.default_model.clone())
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());

        let messages: Vec<OpenAIMessage> = request
            .messages
            .iter()
            .map(|m| OpenAIMessage {
                role: match m.role {
                    ChatRole::System => "system".to_string(),
                    ChatRole::User => "user".to_string(),
                    ChatRole::Assistant => "assistant".to_string(),
                },
                content: Some(m.content.clone()),
            })
            .collect();

        let api_request = OpenAIRequest {
            model: model.clone(),
            messages,
            max_tokens: request.max_tokens.or(Some(self.config.max_tokens)),
            temperature: request.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url());

        let mut builder = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        if self.config.provider == Provider::OpenRouter {
            builder = builder.header("X-Title", "solgen");
        }

        let response = builder
            .json(&api_request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.config.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.config.timeout_secs))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<OpenAIError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => body,
            };
            return Err(status_error(self.config.provider, status, message));
        }

        let api_response: OpenAIResponse = serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        let choice = api_response
            .choices
            .first()
            .ok_or_else(|| Error::MalformedResponse("No choices in response".to_string()))?;

        let content = choice
            .message
            .content
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                Error::MalformedResponse("response missing assistant content".to_string())
            })?;

        let stop_reason = choice.finish_reason.as_deref().map(|r| match r {
            "length" => StopReason::MaxTokens,
            "stop" => StopReason::EndTurn,
            _ => StopReason::EndTurn,
        });

        let usage = api_response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: api_response.id,
            model: if api_response.model.is_empty() {
                model
            } else {
                api_response.model
            },
            content,
            stop_reason,
            usage,
            timestamp: Utc::now(),
        })
    }

    fn provider(&self) -> Provider {
        self.config.provider
    }
}
