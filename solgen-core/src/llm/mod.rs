//! LLM client abstraction and the model caller.
//!
//! This module provides a unified interface over the supported providers
//! (Anthropic, OpenAI, OpenRouter) and the [`ModelCaller`] the pipelines use to
//! send one ordered conversation and receive raw assistant text.
//!
//! ## Example
//!
//! ```rust,ignore
//! use solgen_core::llm::{client_from_config, CallOptions, ChatMessage, ClientConfig, ModelCaller};
//!
//! let client = client_from_config(ClientConfig::from_env()?)?;
//! let caller = ModelCaller::new(client).with_options(CallOptions::new().with_temperature(0.2));
//!
//! let text = caller
//!     .call(vec![
//!         ChatMessage::system("You write Solidity"),
//!         ChatMessage::user("An ERC20 token named Gold"),
//!     ])
//!     .await?;
//! ```

mod caller;
mod client;
mod types;

pub use caller::{is_rate_limit_message, CallOptions, ModelCallFailure, ModelCaller};
pub use client::{client_from_config, AnthropicClient, ClientConfig, LLMClient, OpenAIClient};
pub use types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, Provider, StopReason, TokenUsage,
};
