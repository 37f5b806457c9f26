//! LLM types for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    OpenAI,
    OpenRouter,
}

impl Provider {
    /// Parse a provider name as used in configuration.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "openai_compatible" => Some(Self::OpenAI),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAI => write!(f, "openai"),
            Self::OpenRouter => write!(f, "openrouter"),
        }
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to use (overrides the client default if set)
    pub model: Option<String>,
    /// Conversation messages, system instructions first
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 1.0)
    pub temperature: Option<f64>,
}

impl CompletionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }

    /// Concatenated system instructions, if any.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Messages without the system instructions.
    pub fn conversation(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.role != ChatRole::System)
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Response ID
    pub id: String,
    /// Model used
    pub model: String,
    /// Generated content
    pub content: String,
    /// Stop reason
    pub stop_reason: Option<StopReason>,
    /// Token usage
    pub usage: TokenUsage,
    /// Response timestamp
    pub timestamp: DateTime<Utc>,
}

impl CompletionResponse {
    /// Build a response carrying only text (used by scripted clients).
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            id: format!("local-{}", Utc::now().timestamp_millis()),
            model: "local".to_string(),
            content: content.into(),
            stop_reason: Some(StopReason::EndTurn),
            usage: TokenUsage::default(),
            timestamp: Utc::now(),
        }
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_clamps_temperature() {
        let req = CompletionRequest::new()
            .with_model("gpt-4o-mini")
            .with_message(ChatMessage::system("You write Solidity"))
            .with_message(ChatMessage::user("An ERC20 token"))
            .with_max_tokens(4096)
            .with_temperature(1.7);

        assert_eq!(req.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.max_tokens, Some(4096));
        assert_eq!(req.temperature, Some(1.0));
        assert_eq!(req.system_prompt(), Some("You write Solidity".to_string()));
        assert_eq!(req.conversation().count(), 1);
    }

    #[test]
    fn test_system_prompt_absent() {
        let req = CompletionRequest::new().with_message(ChatMessage::user("hi"));
        assert!(req.system_prompt().is_none());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(Provider::parse("Anthropic"), Some(Provider::Anthropic));
        assert_eq!(Provider::parse("openrouter"), Some(Provider::OpenRouter));
        assert_eq!(Provider::parse("openai_compatible"), Some(Provider::OpenAI));
        assert_eq!(Provider::parse("gemini"), None);
        assert_eq!(Provider::OpenRouter.to_string(), "openrouter");
    }
}
