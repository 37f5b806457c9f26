//! # solgen-core
//!
//! Turns natural-language descriptions into compiling Solidity contracts and
//! documents them with batched model analysis.
//!
//! ## Core Components
//!
//! - **Extract**: Recovers JSON from free-form model output
//! - **LLM**: Provider clients and the failure-normalizing model caller
//! - **Compiler**: solc standard-JSON adapter and contract selection
//! - **Flatten**: Dependency flattening with license/pragma normalization
//! - **Generate**: Draft, compile and repair loop with a bounded attempt budget
//! - **Analysis**: Failure-tolerant batched documentation and diagrams
//!
//! ## Example
//!
//! ```rust,ignore
//! use solgen_core::{client_from_config, ClientConfig, GenerationOrchestrator, ModelCaller, ToolCapabilities};
//!
//! let tools = ToolCapabilities::detect();
//! let caller = ModelCaller::new(client_from_config(ClientConfig::from_env()?)?);
//! let orchestrator = GenerationOrchestrator::new(caller, tools.compiler(), tools.flattener());
//!
//! let result = orchestrator.generate("A crowdfunding vault with a deadline").await?;
//! println!("{} attempt(s), success: {}", result.attempts_used, result.is_success());
//! ```

pub mod analysis;
pub mod compiler;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod flatten;
pub mod generate;
pub mod llm;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use analysis::{
    abi_function_names, retry_with_backoff, DiagramAnalyzer, DiagramData, DiagramReport,
    DocumentationAnalyzer, DocumentationReport, FunctionAnalysis, Retried, RetryPolicy,
};
pub use compiler::{
    compile, CompileOutcome, Compiler, CompilerSettings, ContractArtifact, Diagnostic,
    Diagnostics, Severity, SolcCompiler,
};
pub use config::{PipelineConfig, ToolCapabilities};
pub use error::{Error, Result};
pub use events::{CollectingSink, EventSink, NullSink, PipelineEvent, PipelineEventType, TracingSink};
pub use extract::{
    extract, extract_with_shape, sanitize_json, ExpectedShape, ExtractionOutcome,
    ExtractionStrategy, StructuredExtractor,
};
pub use flatten::{
    normalize_flattened, prepare_compilation_unit, CommandFlattener, Flattener,
    PassthroughFlattener, PreparedSource,
};
pub use generate::{
    AttemptKind, AttemptOutcome, GeneratedContractResult, GenerationAttempt,
    GenerationOrchestrator, GenerationRequest, GenerationState,
};
pub use llm::{
    client_from_config, CallOptions, ChatMessage, ClientConfig, CompletionRequest,
    CompletionResponse, LLMClient, ModelCallFailure, ModelCaller, Provider,
};
