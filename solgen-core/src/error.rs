//! Error types for solgen-core.

use thiserror::Error;

/// Result type alias using solgen-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while generating, compiling or analyzing contracts.
#[derive(Error, Debug)]
pub enum Error {
    /// LLM API error reported by the provider
    #[error("LLM API error: {provider} - {message}")]
    LlmApi { provider: String, message: String },

    /// LLM error (transport or client side)
    #[error("LLM error: {0}")]
    LLM(String),

    /// Provider refused the request because of rate limiting
    #[error("LLM rate limit: {0}")]
    RateLimited(String),

    /// Provider answered with a body the client could not interpret
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Subprocess communication error
    #[error("Subprocess communication error: {0}")]
    SubprocessComm(String),

    /// Compiler invocation failed before producing output
    #[error("Compiler error: {0}")]
    Compiler(String),

    /// Compiler reported no errors but produced no contracts
    #[error("Compiler produced no contracts for `{contract_name}` and reported no errors")]
    FatalCompilerState { contract_name: String },

    /// Dependency flattening failed
    #[error("Flattening error: {0}")]
    Flatten(String),

    /// Every extraction strategy failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Caller supplied unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a fatal compiler state error.
    pub fn fatal_compiler_state(contract_name: impl Into<String>) -> Self {
        Self::FatalCompilerState {
            contract_name: contract_name.into(),
        }
    }

    /// Whether this error must abort the current request instead of being
    /// folded into retry state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalCompilerState { .. })
    }
}
