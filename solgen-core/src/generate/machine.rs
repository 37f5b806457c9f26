//! Generation loop state machine.
//!
//! The transition function is pure; the orchestrator performs the I/O each
//! state asks for and feeds the result back as an event.

use serde::{Deserialize, Serialize};

/// Loop state. `attempt` counts from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GenerationState {
    /// Ask the model for a fresh draft or a refinement
    Drafting { attempt: u32 },
    /// Compile the current candidate
    Compiling { attempt: u32 },
    /// Ask the model to fix the current candidate
    Repairing { attempt: u32 },
    Success { attempts_used: u32 },
    Exhausted { attempts_used: u32 },
}

/// Result of the work done in a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationEvent {
    /// The model returned a candidate
    CandidateReady,
    /// The model call failed; `has_candidate` is whether an earlier attempt
    /// left a candidate to repair
    ModelFailed { has_candidate: bool },
    CompileSucceeded,
    /// Compilation reported errors or the compiler itself failed
    CompileFailed,
}

impl GenerationState {
    pub fn initial() -> Self {
        Self::Drafting { attempt: 1 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Exhausted { .. })
    }

    /// Current attempt number, or attempts used once terminal.
    pub fn attempt(&self) -> u32 {
        match *self {
            Self::Drafting { attempt }
            | Self::Compiling { attempt }
            | Self::Repairing { attempt } => attempt,
            Self::Success { attempts_used } | Self::Exhausted { attempts_used } => attempts_used,
        }
    }
}

/// Next state after a failed attempt.
fn after_failure(attempt: u32, has_candidate: bool, max_attempts: u32) -> GenerationState {
    if attempt >= max_attempts {
        GenerationState::Exhausted {
            attempts_used: attempt,
        }
    } else if has_candidate {
        GenerationState::Repairing {
            attempt: attempt + 1,
        }
    } else {
        GenerationState::Drafting {
            attempt: attempt + 1,
        }
    }
}

/// Advance the loop. Terminal states absorb every event, and events that do
/// not apply to a state leave it unchanged.
pub fn transition(
    state: GenerationState,
    event: GenerationEvent,
    max_attempts: u32,
) -> GenerationState {
    use GenerationEvent::*;
    use GenerationState::*;

    match (state, event) {
        (Drafting { attempt } | Repairing { attempt }, CandidateReady) => Compiling { attempt },
        (Drafting { attempt } | Repairing { attempt }, ModelFailed { has_candidate }) => {
            after_failure(attempt, has_candidate, max_attempts)
        }
        (Compiling { attempt }, CompileSucceeded) => Success {
            attempts_used: attempt,
        },
        (Compiling { attempt }, CompileFailed) => after_failure(attempt, true, max_attempts),
        (state, _) => state,
    }
}
