//! Per-function documentation analysis.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::batch::{AnalysisBatch, BatchRecord, BatchRunner, DEFAULT_BATCH_SIZE};
use crate::events::EventSink;
use crate::llm::{ChatMessage, ModelCaller};

const DOCUMENTATION_SYSTEM_PROMPT: &str = "You are a Solidity auditor writing developer \
documentation. Reply with a single JSON object and nothing else.";

/// Documentation for one contract function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionAnalysis {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_mutability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_notes: Option<Value>,
    /// Fields the model added beyond the known ones
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl BatchRecord for FunctionAnalysis {
    fn from_response(value: Value) -> Option<Self> {
        match value {
            Value::String(description) => Some(Self {
                description,
                ..Self::default()
            }),
            Value::Object(_) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }
}

/// Function names declared in an ABI, overloads collapsed, first-seen order.
pub fn abi_function_names(abi: &Value) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let entries = abi.as_array().map(Vec::as_slice).unwrap_or_default();
    for entry in entries {
        if entry.get("type").and_then(Value::as_str) != Some("function") {
            continue;
        }
        if let Some(name) = entry.get("name").and_then(Value::as_str) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Merged documentation for a contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationReport {
    pub function_names: Vec<String>,
    pub analyses: IndexMap<String, FunctionAnalysis>,
    pub overall_success: bool,
    pub failed_batches: Vec<usize>,
}

impl DocumentationReport {
    /// Nothing was analyzed although there was something to analyze.
    pub fn is_total_failure(&self) -> bool {
        self.analyses.is_empty() && !self.function_names.is_empty()
    }
}

/// Batched documentation pipeline.
pub struct DocumentationAnalyzer {
    caller: ModelCaller,
    batch_size: usize,
    sink: Option<Arc<dyn EventSink>>,
}

impl DocumentationAnalyzer {
    pub fn new(caller: ModelCaller) -> Self {
        Self {
            caller,
            batch_size: DEFAULT_BATCH_SIZE,
            sink: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Analyze every function in `abi`. Batch failures never abort the run.
    pub async fn analyze(&self, source: &str, abi: &Value) -> DocumentationReport {
        let function_names = abi_function_names(abi);
        let abi_text = abi.to_string();

        let mut runner = BatchRunner::new(&self.caller, "documentation")
            .with_batch_size(self.batch_size);
        if let Some(sink) = &self.sink {
            runner = runner.with_sink(Arc::clone(sink));
        }

        let accumulator = runner
            .run::<FunctionAnalysis, _>(&function_names, |batch| {
                documentation_messages(source, &abi_text, batch)
            })
            .await;

        let (analyses, overall_success, failed_batches) = accumulator.into_parts();
        let report = DocumentationReport {
            function_names,
            analyses,
            overall_success,
            failed_batches,
        };

        if report.is_total_failure() {
            warn!(functions = report.function_names.len(), "documentation produced no entries");
        } else {
            info!(
                functions = report.function_names.len(),
                analyzed = report.analyses.len(),
                overall_success = report.overall_success,
                "documentation complete"
            );
        }
        report
    }
}

fn documentation_messages(source: &str, abi: &str, batch: &AnalysisBatch) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(DOCUMENTATION_SYSTEM_PROMPT),
        ChatMessage::user(documentation_prompt(source, abi, &batch.member_names)),
    ]
}

/// Instruction naming exactly the functions of one batch.
pub fn documentation_prompt(source: &str, abi: &str, functions: &[String]) -> String {
    format!(
        "Document ONLY these functions of the contract below: {names}\n\n\
Return a JSON object keyed by function name. Each value is an object with:\n\
- \"description\": what the function does\n\
- \"parameters\": object mapping each parameter name to its meaning\n\
- \"returns\": description of the return values\n\
- \"stateMutability\": pure, view, payable or nonpayable\n\
- \"securityNotes\": array of security considerations\n\
If you cannot analyze them, return {{\"error\": \"<reason>\"}}.\n\n\
Source:\n{source}\n\n\
ABI:\n{abi}",
        names = functions.join(", "),
        source = source.trim(),
        abi = abi
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::ScriptedClient;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn abi_with(names: &[&str]) -> Value {
        let mut entries = vec![json!({"type": "constructor", "inputs": []})];
        for name in names {
            entries.push(json!({"type": "function", "name": name, "inputs": []}));
        }
        entries.push(json!({"type": "event", "name": "Transfer"}));
        Value::Array(entries)
    }

    fn documented(names: &[String]) -> String {
        let map: serde_json::Map<String, Value> = names
            .iter()
            .map(|n| (n.clone(), json!({"description": format!("does {}", n)})))
            .collect();
        Value::Object(map).to_string()
    }

    #[test]
    fn test_abi_function_names() {
        let abi = json!([
            {"type": "function", "name": "transfer"},
            {"type": "event", "name": "Transfer"},
            {"type": "function", "name": "mint"},
            {"type": "function", "name": "transfer"},
            {"type": "fallback"}
        ]);
        assert_eq!(abi_function_names(&abi), vec!["transfer", "mint"]);
        assert!(abi_function_names(&json!({})).is_empty());
    }

    #[test]
    fn test_record_from_response() {
        let plain = FunctionAnalysis::from_response(json!("Mints tokens")).unwrap();
        assert_eq!(plain.description, "Mints tokens");

        let rich = FunctionAnalysis::from_response(json!({
            "description": "Burns",
            "stateMutability": "nonpayable",
            "gasNotes": "cheap"
        }))
        .unwrap();
        assert_eq!(rich.state_mutability.as_deref(), Some("nonpayable"));
        assert_eq!(rich.extra.get("gasNotes"), Some(&json!("cheap")));

        assert!(FunctionAnalysis::from_response(json!(42)).is_none());
    }

    #[tokio::test]
    async fn test_second_batch_extraction_failure_keeps_first() {
        let names: Vec<String> = (1..=7).map(|i| format!("f{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(format!("Sure:\n```json\n{}\n```", documented(&names[..5]))),
            Ok("I could not produce JSON for these.".to_string()),
        ]));
        let analyzer = DocumentationAnalyzer::new(ModelCaller::new(client.clone()));

        let report = analyzer.analyze("contract A {}", &abi_with(&refs)).await;

        assert_eq!(
            report.analyses.keys().cloned().collect::<Vec<_>>(),
            names[..5].to_vec()
        );
        assert!(!report.overall_success);
        assert_eq!(report.failed_batches, vec![1]);
        assert!(!report.is_total_failure());

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("ONLY these functions of the contract below: f6, f7"));
    }

    #[tokio::test]
    async fn test_total_failure() {
        let client = Arc::new(ScriptedClient::new(vec![Err(Error::RateLimited(
            "429".to_string(),
        ))]));
        let analyzer = DocumentationAnalyzer::new(ModelCaller::new(client));

        let report = analyzer.analyze("contract A {}", &abi_with(&["a", "b"])).await;
        assert!(report.is_total_failure());
    }

    #[tokio::test]
    async fn test_no_functions_is_not_a_failure() {
        let client = Arc::new(ScriptedClient::new(vec![]));
        let analyzer = DocumentationAnalyzer::new(ModelCaller::new(client.clone()));

        let report = analyzer.analyze("contract A {}", &abi_with(&[])).await;
        assert!(!report.is_total_failure());
        assert!(report.overall_success);
        assert!(client.requests().is_empty());
    }
}
