//! Bounded generate, compile and repair loop for a single contract.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::machine::{transition, GenerationEvent, GenerationState};
use super::prompt::{self, extract_contract_name, strip_code_fences};
use crate::compiler::{self, Compiler, CompilerSettings, ContractArtifact, Diagnostics};
use crate::error::{Error, Result};
use crate::events::{EventSink, PipelineEvent};
use crate::flatten::{prepare_compilation_unit, Flattener};
use crate::llm::ModelCaller;

/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationRequest {
    Fresh { prompt: String },
    Refine { source: String, prompt: String },
}

impl GenerationRequest {
    fn intent(&self) -> &str {
        match self {
            Self::Fresh { prompt } | Self::Refine { prompt, .. } => prompt,
        }
    }

    /// Source the caller supplied; empty for a fresh generation.
    fn supplied_source(&self) -> &str {
        match self {
            Self::Fresh { .. } => "",
            Self::Refine { source, .. } => source,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Fresh { .. } => "generate",
            Self::Refine { .. } => "refine",
        }
    }
}

/// Kind of model call an attempt made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    Draft,
    Refine,
    Repair,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Refine => "refine",
            Self::Repair => "repair",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    TerminalFailure,
}

impl AttemptOutcome {
    fn after(state: GenerationState) -> Self {
        match state {
            GenerationState::Success { .. } => Self::Success,
            GenerationState::Exhausted { .. } => Self::TerminalFailure,
            _ => Self::RetryableFailure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RetryableFailure => "retryable_failure",
            Self::TerminalFailure => "terminal_failure",
        }
    }
}

/// One completed iteration of the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationAttempt {
    pub attempt_number: u32,
    pub kind: AttemptKind,
    /// Candidate source after fence stripping (empty when the model failed
    /// before any candidate existed)
    pub source: String,
    /// SHA-256 of `source`, hex
    pub source_digest: String,
    pub diagnostics: Diagnostics,
    pub outcome: AttemptOutcome,
}

impl GenerationAttempt {
    fn new(
        attempt_number: u32,
        kind: AttemptKind,
        source: &str,
        diagnostics: Diagnostics,
        outcome: AttemptOutcome,
    ) -> Self {
        Self {
            attempt_number,
            kind,
            source: source.to_string(),
            source_digest: format!("{:x}", Sha256::digest(source.as_bytes())),
            diagnostics,
            outcome,
        }
    }
}

/// Outcome of one orchestrator invocation.
///
/// `abi` and `bytecode` are present exactly when `diagnostics.errors` is
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContractResult {
    pub source: String,
    pub contract_name: String,
    pub abi: Option<Value>,
    pub bytecode: Option<String>,
    pub deployed_bytecode: Option<String>,
    pub diagnostics: Diagnostics,
    pub attempts_used: u32,
    pub history: Vec<GenerationAttempt>,
}

impl GeneratedContractResult {
    fn succeeded(
        source: String,
        artifact: ContractArtifact,
        diagnostics: Diagnostics,
        attempts_used: u32,
        history: Vec<GenerationAttempt>,
    ) -> Self {
        Self {
            source,
            contract_name: artifact.name,
            abi: Some(artifact.abi),
            bytecode: Some(artifact.bytecode),
            deployed_bytecode: Some(artifact.deployed_bytecode),
            diagnostics: Diagnostics {
                errors: Vec::new(),
                warnings: diagnostics.warnings,
            },
            attempts_used,
            history,
        }
    }

    fn exhausted(
        source: String,
        mut diagnostics: Diagnostics,
        attempts_used: u32,
        history: Vec<GenerationAttempt>,
    ) -> Self {
        if diagnostics.errors.is_empty() {
            diagnostics = Diagnostics::single_error("generation failed without diagnostics");
        }
        Self {
            contract_name: extract_contract_name(&source),
            source,
            abi: None,
            bytecode: None,
            deployed_bytecode: None,
            diagnostics,
            attempts_used,
            history,
        }
    }

    pub fn is_success(&self) -> bool {
        self.diagnostics.errors.is_empty() && self.abi.is_some()
    }
}

/// Drives the generation loop. One `run` per request; the instance holds only
/// configuration and collaborators.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    caller: ModelCaller,
    compiler: Arc<dyn Compiler>,
    flattener: Arc<dyn Flattener>,
    settings: CompilerSettings,
    work_dir: PathBuf,
    max_attempts: u32,
    sink: Arc<dyn EventSink>,
}

impl GenerationOrchestrator {
    pub fn new(
        caller: ModelCaller,
        compiler: Arc<dyn Compiler>,
        flattener: Arc<dyn Flattener>,
    ) -> Self {
        let sink = caller.sink();
        Self {
            caller,
            compiler,
            flattener,
            settings: CompilerSettings::default(),
            work_dir: std::env::temp_dir(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            sink,
        }
    }

    pub fn with_settings(mut self, settings: CompilerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Attempt budget; at least one attempt is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Generate a contract from a prose description.
    pub async fn generate(&self, prompt: &str) -> Result<GeneratedContractResult> {
        self.run(GenerationRequest::Fresh {
            prompt: prompt.to_string(),
        })
        .await
    }

    /// Modify an existing contract according to a prose description.
    pub async fn refine(&self, source: &str, prompt: &str) -> Result<GeneratedContractResult> {
        self.run(GenerationRequest::Refine {
            source: source.to_string(),
            prompt: prompt.to_string(),
        })
        .await
    }

    pub async fn run(&self, request: GenerationRequest) -> Result<GeneratedContractResult> {
        if request.intent().trim().is_empty() {
            return Err(Error::InvalidInput("prompt must not be empty".to_string()));
        }

        let label = request.label();
        let mut state = GenerationState::initial();
        let mut candidate: Option<String> = None;
        let mut diagnostics = Diagnostics::new();
        let mut artifact: Option<ContractArtifact> = None;
        let mut history: Vec<GenerationAttempt> = Vec::new();
        // Kind of the call that produced the current candidate.
        let mut kind = AttemptKind::Draft;

        loop {
            match state {
                GenerationState::Drafting { attempt } | GenerationState::Repairing { attempt } => {
                    kind = match (state, &request) {
                        (GenerationState::Repairing { .. }, _) => AttemptKind::Repair,
                        (_, GenerationRequest::Fresh { .. }) => AttemptKind::Draft,
                        (_, GenerationRequest::Refine { .. }) => AttemptKind::Refine,
                    };
                    self.sink
                        .emit(PipelineEvent::attempt_start(label, attempt, kind.as_str()));

                    let instruction = match (kind, &request, candidate.as_deref()) {
                        (AttemptKind::Repair, _, Some(last)) => {
                            prompt::corrective_prompt(request.intent(), last, &diagnostics)
                        }
                        (_, GenerationRequest::Refine { source, prompt: intent }, _) => {
                            prompt::refinement_prompt(source, intent)
                        }
                        (_, GenerationRequest::Fresh { prompt: intent }, _) => {
                            prompt::generation_prompt(intent)
                        }
                    };
                    let messages = prompt::messages(&self.settings, instruction);
                    let call_label = format!("{} attempt {}", label, attempt);

                    match self.caller.call_labelled(&call_label, messages).await {
                        Ok(text) => {
                            candidate = Some(strip_code_fences(&text));
                            state = transition(
                                state,
                                GenerationEvent::CandidateReady,
                                self.max_attempts,
                            );
                        }
                        Err(err) => {
                            diagnostics =
                                Diagnostics::single_error(format!("Model call failed: {}", err));
                            state = transition(
                                state,
                                GenerationEvent::ModelFailed {
                                    has_candidate: candidate.is_some(),
                                },
                                self.max_attempts,
                            );
                            self.record(
                                &mut history,
                                label,
                                attempt,
                                kind,
                                candidate.as_deref().unwrap_or(""),
                                &diagnostics,
                                state,
                            );
                        }
                    }
                }

                GenerationState::Compiling { attempt } => {
                    let source = candidate.clone().ok_or_else(|| {
                        Error::Internal("compiling without a candidate".to_string())
                    })?;
                    let contract_name = extract_contract_name(&source);
                    let prepared = prepare_compilation_unit(
                        self.flattener.as_ref(),
                        &source,
                        &self.settings,
                        &self.work_dir,
                        None,
                    )
                    .await;

                    match compiler::compile(
                        self.compiler.as_ref(),
                        &self.settings,
                        &prepared.source,
                        &contract_name,
                    )
                    .await
                    {
                        Ok(outcome) => {
                            let (compiled_diagnostics, compiled) = outcome.into_parts();
                            diagnostics = compiled_diagnostics;
                            let event = if compiled.is_some() {
                                GenerationEvent::CompileSucceeded
                            } else {
                                GenerationEvent::CompileFailed
                            };
                            artifact = compiled;
                            state = transition(state, event, self.max_attempts);
                        }
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            warn!(attempt, error = %err, "compiler invocation failed");
                            diagnostics =
                                Diagnostics::single_error(format!("Compilation failed: {}", err));
                            state = transition(
                                state,
                                GenerationEvent::CompileFailed,
                                self.max_attempts,
                            );
                        }
                    }

                    self.record(
                        &mut history,
                        label,
                        attempt,
                        kind,
                        &source,
                        &diagnostics,
                        state,
                    );
                }

                GenerationState::Success { attempts_used } => {
                    let artifact = artifact.ok_or_else(|| {
                        Error::Internal("successful generation without artifact".to_string())
                    })?;
                    info!(
                        label,
                        attempts_used,
                        contract = %artifact.name,
                        "generation succeeded"
                    );
                    return Ok(GeneratedContractResult::succeeded(
                        candidate.unwrap_or_else(|| request.supplied_source().to_string()),
                        artifact,
                        diagnostics,
                        attempts_used,
                        history,
                    ));
                }

                GenerationState::Exhausted { attempts_used } => {
                    warn!(
                        label,
                        attempts_used,
                        errors = diagnostics.errors.len(),
                        "generation exhausted its attempts"
                    );
                    return Ok(GeneratedContractResult::exhausted(
                        candidate.unwrap_or_else(|| request.supplied_source().to_string()),
                        diagnostics,
                        attempts_used,
                        history,
                    ));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        history: &mut Vec<GenerationAttempt>,
        label: &str,
        attempt: u32,
        kind: AttemptKind,
        source: &str,
        diagnostics: &Diagnostics,
        next: GenerationState,
    ) {
        let outcome = AttemptOutcome::after(next);
        self.sink.emit(PipelineEvent::attempt_end(
            label,
            attempt,
            outcome.as_str(),
            diagnostics.errors.len(),
        ));
        history.push(GenerationAttempt::new(
            attempt,
            kind,
            source,
            diagnostics.clone(),
            outcome,
        ));
    }
}
