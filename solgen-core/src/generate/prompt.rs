//! Prompts for drafting, refining and repairing contracts.

use std::sync::LazyLock;

use regex::Regex;

use crate::compiler::{CompilerSettings, Diagnostics};
use crate::llm::ChatMessage;

/// Name used when the candidate declares no concrete contract.
pub const DEFAULT_CONTRACT_NAME: &str = "MyContract";

static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("invalid regex")
});

static CONTRACT_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(abstract[ \t]+)?contract[ \t]+([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("invalid regex")
});

/// System instructions for every generation call.
pub fn system_prompt(settings: &CompilerSettings) -> String {
    format!(
        "You are an expert Solidity engineer. You write secure, gas-efficient smart contracts \
that compile without errors.\n\
\n\
Rules:\n\
- Reply with the complete Solidity source file and nothing else: no explanations, no markdown.\n\
- Start with `// SPDX-License-Identifier: MIT` followed by `{pragma}`.\n\
- Target EVM version {evm}.\n\
- OpenZeppelin contracts may be imported with `@openzeppelin/contracts/...` paths.\n\
- Declare exactly one deployable (non-abstract) contract; helper interfaces and libraries are allowed.\n\
- Use custom errors or require messages for every failing condition.",
        pragma = settings.pragma_line(),
        evm = settings.evm_version
    )
}

/// Instruction for a fresh draft.
pub fn generation_prompt(intent: &str) -> String {
    format!(
        "Write a Solidity smart contract for the following description.\n\n\
Description:\n{}",
        intent.trim()
    )
}

/// Instruction to refine an existing contract.
pub fn refinement_prompt(source: &str, intent: &str) -> String {
    format!(
        "Modify the Solidity contract below according to the requested changes. \
Return the full updated source.\n\n\
Requested changes:\n{}\n\n\
Current source:\n{}",
        intent.trim(),
        source.trim()
    )
}

/// Corrective instruction carrying the original intent, the last candidate
/// and its diagnostics rendered as `SEVERITY: message`.
pub fn corrective_prompt(intent: &str, source: &str, diagnostics: &Diagnostics) -> String {
    format!(
        "The Solidity contract below was written for this description:\n{}\n\n\
It fails to compile. Compiler output:\n{}\n\n\
Source:\n{}\n\n\
Fix every error and return the full corrected source. Keep the intended behavior.",
        intent.trim(),
        diagnostics.render(),
        source.trim()
    )
}

/// Conversation for one model call.
pub fn messages(settings: &CompilerSettings, instruction: String) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(settings)),
        ChatMessage::user(instruction),
    ]
}

/// Remove markdown code fences around model output.
///
/// The first fenced block wins; an unterminated opening fence is dropped
/// along with its language tag.
pub fn strip_code_fences(text: &str) -> String {
    if let Some(body) = FENCED_CODE.captures(text).and_then(|c| c.get(1)) {
        return body.as_str().trim().to_string();
    }

    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
            body.trim_end_matches('`').trim().to_string()
        }
        None => trimmed.to_string(),
    }
}

/// Name of the first non-abstract contract declared in `source`.
pub fn extract_contract_name(source: &str) -> String {
    CONTRACT_DECLARATION
        .captures_iter(source)
        .find(|caps| caps.get(1).is_none())
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_CONTRACT_NAME.to_string())
}
