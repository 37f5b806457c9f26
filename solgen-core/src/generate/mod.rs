//! Contract generation: draft or refine with the model, compile, feed the
//! diagnostics back, and stop on success or when the attempt budget is spent.
//!
//! ## Example
//!
//! ```rust,ignore
//! use solgen_core::generate::GenerationOrchestrator;
//!
//! let orchestrator = GenerationOrchestrator::new(caller, compiler, flattener)
//!     .with_max_attempts(3);
//!
//! let result = orchestrator.generate("An ERC20 token with a 1M supply cap").await?;
//! if result.is_success() {
//!     println!("{} compiled after {} attempt(s)", result.contract_name, result.attempts_used);
//! }
//! ```

mod machine;
mod orchestrator;
pub mod prompt;

pub use machine::{transition, GenerationEvent, GenerationState};
pub use orchestrator::{
    AttemptKind, AttemptOutcome, GeneratedContractResult, GenerationAttempt,
    GenerationOrchestrator, GenerationRequest, DEFAULT_MAX_ATTEMPTS,
};
pub use prompt::{extract_contract_name, strip_code_fences, DEFAULT_CONTRACT_NAME};
