//! Compiler diagnostics, settings and the solc standard-JSON wire format.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Diagnostic severity kept by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// Map a solc severity string; anything else (e.g. `info`) is dropped.
    pub fn parse(severity: &str) -> Option<Self> {
        match severity.to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// A single compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_message: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            formatted_message: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            formatted_message: None,
        }
    }

    pub fn with_formatted_message(mut self, formatted: impl Into<String>) -> Self {
        self.formatted_message = Some(formatted.into());
        self
    }

    /// `SEVERITY: message`, as embedded in corrective prompts.
    pub fn render(&self) -> String {
        format!(
            "{}: {}",
            self.severity.as_str().to_ascii_uppercase(),
            self.message
        )
    }
}

/// Diagnostics of one compilation, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A diagnostics set holding one synthetic error.
    pub fn single_error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![Diagnostic::error(message)],
            warnings: Vec::new(),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors.push(diagnostic),
            Severity::Warning => self.warnings.push(diagnostic),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Render errors then warnings, one per line.
    pub fn render(&self) -> String {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .map(Diagnostic::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fixed compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerSettings {
    /// Target compiler version used for the pragma
    pub solc_version: String,
    /// EVM target
    pub evm_version: String,
    /// Optimizer runs (optimizer always enabled)
    pub optimizer_runs: u32,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            solc_version: "0.8.19".to_string(),
            evm_version: "paris".to_string(),
            optimizer_runs: 200,
        }
    }
}

impl CompilerSettings {
    /// Requested outputs for every contract.
    pub const OUTPUT_SELECTION: [&'static str; 6] = [
        "abi",
        "evm.bytecode",
        "evm.deployedBytecode",
        "metadata",
        "devdoc",
        "userdoc",
    ];

    /// The pragma statement targeting this compiler version.
    pub fn pragma_line(&self) -> String {
        format!("pragma solidity ^{};", self.solc_version)
    }
}

/// One source file in a standard-JSON input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub enabled: bool,
    pub runs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardJsonSettings {
    pub optimizer: OptimizerSettings,
    pub evm_version: String,
    pub output_selection: IndexMap<String, IndexMap<String, Vec<String>>>,
}

/// `solc --standard-json` input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardJsonInput {
    pub language: String,
    pub sources: IndexMap<String, SourceEntry>,
    pub settings: StandardJsonSettings,
}

impl StandardJsonInput {
    /// Single-source input with the fixed settings.
    pub fn new(
        file_name: impl Into<String>,
        source: impl Into<String>,
        settings: &CompilerSettings,
    ) -> Self {
        let mut sources = IndexMap::new();
        sources.insert(
            file_name.into(),
            SourceEntry {
                content: source.into(),
            },
        );

        let mut per_contract = IndexMap::new();
        per_contract.insert(
            "*".to_string(),
            CompilerSettings::OUTPUT_SELECTION
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let mut output_selection = IndexMap::new();
        output_selection.insert("*".to_string(), per_contract);

        Self {
            language: "Solidity".to_string(),
            sources,
            settings: StandardJsonSettings {
                optimizer: OptimizerSettings {
                    enabled: true,
                    runs: settings.optimizer_runs,
                },
                evm_version: settings.evm_version.clone(),
                output_selection,
            },
        }
    }
}

/// Diagnostic entry in a standard-JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolcError {
    pub severity: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub formatted_message: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolcBytecode {
    #[serde(default)]
    pub object: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolcEvm {
    #[serde(default)]
    pub bytecode: Option<SolcBytecode>,
    #[serde(default)]
    pub deployed_bytecode: Option<SolcBytecode>,
}

/// One compiled contract in a standard-JSON output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolcContract {
    #[serde(default)]
    pub abi: Value,
    #[serde(default)]
    pub evm: Option<SolcEvm>,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub devdoc: Option<Value>,
    #[serde(default)]
    pub userdoc: Option<Value>,
}

impl SolcContract {
    /// Creation bytecode as emitted, if any.
    pub fn creation_bytecode(&self) -> &str {
        self.evm
            .as_ref()
            .and_then(|evm| evm.bytecode.as_ref())
            .map(|b| b.object.as_str())
            .unwrap_or("")
    }

    pub fn deployed_bytecode(&self) -> &str {
        self.evm
            .as_ref()
            .and_then(|evm| evm.deployed_bytecode.as_ref())
            .map(|b| b.object.as_str())
            .unwrap_or("")
    }
}

/// `solc --standard-json` output document.
///
/// Contract maps are insertion-ordered so selection follows emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardJsonOutput {
    #[serde(default)]
    pub errors: Vec<SolcError>,
    #[serde(default)]
    pub contracts: IndexMap<String, IndexMap<String, SolcContract>>,
}

impl StandardJsonOutput {
    /// Whether any source unit produced at least one contract.
    pub fn has_contracts(&self) -> bool {
        self.contracts.values().any(|unit| !unit.is_empty())
    }
}

/// The selected contract of a successful compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub name: String,
    pub source_unit: String,
    pub abi: Value,
    /// Creation bytecode, lower-case hex without `0x`
    pub bytecode: String,
    pub deployed_bytecode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devdoc: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userdoc: Option<Value>,
}

/// Result of compiling one source.
///
/// An artifact is present exactly when there are no errors.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutcome {
    diagnostics: Diagnostics,
    artifact: Option<ContractArtifact>,
}

impl CompileOutcome {
    /// Failed compilation. An empty error list is replaced by a generic error
    /// so the outcome stays a failure.
    pub fn failed(mut diagnostics: Diagnostics) -> Self {
        if diagnostics.errors.is_empty() {
            diagnostics
                .errors
                .push(Diagnostic::error("compilation failed without diagnostics"));
        }
        Self {
            diagnostics,
            artifact: None,
        }
    }

    /// Successful compilation; only warnings are kept.
    pub fn succeeded(artifact: ContractArtifact, warnings: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics: Diagnostics {
                errors: Vec::new(),
                warnings,
            },
            artifact: Some(artifact),
        }
    }

    pub fn is_success(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn artifact(&self) -> Option<&ContractArtifact> {
        self.artifact.as_ref()
    }

    pub fn into_parts(self) -> (Diagnostics, Option<ContractArtifact>) {
        (self.diagnostics, self.artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_input_document_shape() {
        let input = StandardJsonInput::new(
            "Token.sol",
            "contract Token {}",
            &CompilerSettings::default(),
        );
        let value = serde_json::to_value(&input).unwrap();

        assert_eq!(
            value,
            json!({
                "language": "Solidity",
                "sources": {"Token.sol": {"content": "contract Token {}"}},
                "settings": {
                    "optimizer": {"enabled": true, "runs": 200},
                    "evmVersion": "paris",
                    "outputSelection": {"*": {"*": [
                        "abi", "evm.bytecode", "evm.deployedBytecode",
                        "metadata", "devdoc", "userdoc"
                    ]}}
                }
            })
        );
    }

    #[test]
    fn test_output_preserves_emission_order() {
        let output: StandardJsonOutput = serde_json::from_str(
            r#"{"contracts": {"a.sol": {"Zed": {}, "Alpha": {}, "Mid": {}}}}"#,
        )
        .unwrap();
        let names: Vec<&String> = output.contracts["a.sol"].keys().collect();
        assert_eq!(names, vec!["Zed", "Alpha", "Mid"]);
        assert!(output.errors.is_empty());
    }

    #[test]
    fn test_diagnostic_render() {
        assert_eq!(
            Diagnostic::error("Expected ';' but got '}'").render(),
            "ERROR: Expected ';' but got '}'"
        );
        assert_eq!(Diagnostic::warning("unused").render(), "WARNING: unused");
        assert_eq!(Severity::parse("info"), None);
    }

    #[test]
    fn test_failed_outcome_never_empty() {
        let outcome = CompileOutcome::failed(Diagnostics::new());
        assert!(!outcome.is_success());
        assert_eq!(outcome.diagnostics().errors.len(), 1);
    }

    #[test]
    fn test_pragma_line() {
        assert_eq!(
            CompilerSettings::default().pragma_line(),
            "pragma solidity ^0.8.19;"
        );
    }
}
