//! Model caller: one ordered conversation in, raw assistant text out.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::client::LLMClient;
use super::types::{ChatMessage, CompletionRequest, Provider};
use crate::error::{Error, Result};
use crate::events::{EventSink, PipelineEvent, TracingSink};

/// Substrings that mark an error message as a rate-limit refusal.
const RATE_LIMIT_INDICATORS: &[&str] = &[
    "429",
    "rate limit",
    "rate_limit",
    "too many requests",
    "overloaded",
];

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Model override
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Max tokens to generate
    pub max_tokens: Option<u32>,
    /// Deadline for a single call
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Classification of a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCallFailure {
    Network,
    Timeout,
    RateLimited,
    MalformedResponse,
    Api,
}

impl ModelCallFailure {
    /// Classify an error returned by a client.
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::Timeout { .. } => Self::Timeout,
            Error::RateLimited(_) => Self::RateLimited,
            Error::MalformedResponse(_) | Error::Serialization(_) => Self::MalformedResponse,
            other if is_rate_limit_message(&other.to_string()) => Self::RateLimited,
            Error::LlmApi { .. } => Self::Api,
            _ => Self::Network,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::MalformedResponse => "malformed_response",
            Self::Api => "api",
        }
    }
}

impl std::fmt::Display for ModelCallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an error message carries a rate-limit indicator.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_INDICATORS.iter().any(|needle| lower.contains(needle))
}

/// Sends conversations to a model client.
///
/// Calls are awaited one at a time by their owners; the caller itself holds
/// no per-call state.
#[derive(Clone)]
pub struct ModelCaller {
    client: Arc<dyn LLMClient>,
    options: CallOptions,
    sink: Arc<dyn EventSink>,
}

impl ModelCaller {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            options: CallOptions::default(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn provider(&self) -> Provider {
        self.client.provider()
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.sink)
    }

    fn build_request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        let mut request = CompletionRequest::new().with_messages(messages);
        if let Some(model) = &self.options.model {
            request = request.with_model(model.clone());
        }
        if let Some(temperature) = self.options.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.options.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    /// Send the conversation and return the assistant's raw text.
    pub async fn call(&self, messages: Vec<ChatMessage>) -> Result<String> {
        if messages.is_empty() {
            return Err(Error::InvalidInput("no messages to send".to_string()));
        }

        let request = self.build_request(messages);
        let response = match self.options.timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.client.complete(request))
                .await
                .map_err(|_| Error::timeout(deadline.as_millis() as u64))??,
            None => self.client.complete(request).await?,
        };

        debug!(
            provider = %self.client.provider(),
            model = %response.model,
            output_tokens = response.usage.output_tokens,
            total_tokens = response.usage.total(),
            "model call completed"
        );
        Ok(response.content)
    }

    /// Send the conversation, logging and reporting a failure under `label`
    /// before returning it.
    pub async fn call_labelled(&self, label: &str, messages: Vec<ChatMessage>) -> Result<String> {
        let result = self.call(messages).await;
        if let Err(err) = &result {
            let failure = ModelCallFailure::classify(err);
            warn!(label, failure = %failure, error = %err, "model call failed");
            self.sink.emit(PipelineEvent::model_call_failed(
                label,
                failure.as_str(),
                &err.to_string(),
            ));
        }
        result
    }

    /// Send the conversation, normalizing any failure to `None`.
    ///
    /// `label` names the phase (attempt, batch) in logs and events.
    pub async fn call_or_none(&self, label: &str, messages: Vec<ChatMessage>) -> Option<String> {
        self.call_labelled(label, messages).await.ok()
    }
}
