//! Compiler adapter.
//!
//! Compiles one source with the fixed configuration, classifies diagnostics
//! and deterministically selects the result contract when the compilation
//! unit defines several.

mod solc;
mod types;

pub use solc::SolcCompiler;
pub use types::{
    CompileOutcome, CompilerSettings, ContractArtifact, Diagnostic, Diagnostics, OptimizerSettings,
    Severity, SolcBytecode, SolcContract, SolcError, SolcEvm, SourceEntry, StandardJsonInput,
    StandardJsonOutput, StandardJsonSettings,
};

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A compiler speaking the solc standard-JSON protocol.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile_standard_json(&self, input: &StandardJsonInput) -> Result<StandardJsonOutput>;
}

/// Split solc diagnostics into errors and warnings, preserving order.
///
/// Severities other than `error` and `warning` are dropped.
pub fn classify_diagnostics(raw: &[SolcError]) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    for entry in raw {
        let Some(severity) = Severity::parse(&entry.severity) else {
            continue;
        };
        diagnostics.push(Diagnostic {
            severity,
            message: entry.message.clone(),
            formatted_message: entry.formatted_message.clone(),
        });
    }
    diagnostics
}

/// A contract chosen from compiler output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedContract<'a> {
    pub source_unit: &'a str,
    pub name: &'a str,
    pub contract: &'a SolcContract,
}

/// Select the result contract, in order of preference:
/// exact name, case-insensitive name, first with creation bytecode, first.
pub fn select_contract<'a>(
    contracts: &'a IndexMap<String, IndexMap<String, SolcContract>>,
    contract_name: &str,
) -> Option<SelectedContract<'a>> {
    let all: Vec<SelectedContract<'a>> = contracts
        .iter()
        .flat_map(|(unit, members)| {
            members.iter().map(move |(name, contract)| SelectedContract {
                source_unit: unit.as_str(),
                name: name.as_str(),
                contract,
            })
        })
        .collect();

    all.iter()
        .find(|c| c.name == contract_name)
        .or_else(|| {
            all.iter()
                .find(|c| c.name.eq_ignore_ascii_case(contract_name))
        })
        .or_else(|| {
            all.iter()
                .find(|c| !normalize_bytecode(c.contract.creation_bytecode()).is_empty())
        })
        .or_else(|| all.first())
        .copied()
}

/// Lower-case hex without a `0x` prefix.
pub fn normalize_bytecode(bytecode: &str) -> String {
    let trimmed = bytecode.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}

/// Build the artifact for a selected contract.
fn artifact_from(selected: SelectedContract<'_>) -> ContractArtifact {
    ContractArtifact {
        name: selected.name.to_string(),
        source_unit: selected.source_unit.to_string(),
        abi: selected.contract.abi.clone(),
        bytecode: normalize_bytecode(selected.contract.creation_bytecode()),
        deployed_bytecode: normalize_bytecode(selected.contract.deployed_bytecode()),
        metadata: selected.contract.metadata.clone(),
        devdoc: selected.contract.devdoc.clone(),
        userdoc: selected.contract.userdoc.clone(),
    }
}

/// Turn a standard-JSON output into a compile outcome.
///
/// Errors short-circuit without selection. Zero errors with no compiled
/// contract is [`Error::FatalCompilerState`].
pub fn interpret_output(output: &StandardJsonOutput, contract_name: &str) -> Result<CompileOutcome> {
    let diagnostics = classify_diagnostics(&output.errors);
    if diagnostics.has_errors() {
        debug!(
            contract = contract_name,
            errors = diagnostics.errors.len(),
            "compilation reported errors"
        );
        return Ok(CompileOutcome::failed(diagnostics));
    }

    let selected = select_contract(&output.contracts, contract_name)
        .ok_or_else(|| Error::fatal_compiler_state(contract_name))?;

    info!(
        requested = contract_name,
        selected = selected.name,
        source_unit = selected.source_unit,
        "selected compiled contract"
    );
    Ok(CompileOutcome::succeeded(
        artifact_from(selected),
        diagnostics.warnings,
    ))
}

/// Compile `source` and select `contract_name`.
pub async fn compile(
    compiler: &dyn Compiler,
    settings: &CompilerSettings,
    source: &str,
    contract_name: &str,
) -> Result<CompileOutcome> {
    let file_name = format!("{}.sol", contract_name);
    let input = StandardJsonInput::new(file_name, source, settings);
    let output = compiler.compile_standard_json(&input).await?;
    interpret_output(&output, contract_name)
}
