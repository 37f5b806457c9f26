//! Flow diagrams: one general diagram plus batched per-function diagrams.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::batch::{AnalysisBatch, BatchRecord, BatchRunner, DEFAULT_BATCH_SIZE};
use super::documentation::FunctionAnalysis;
use crate::events::EventSink;
use crate::extract::{ExpectedShape, ExtractionOutcome, StructuredExtractor};
use crate::llm::{ChatMessage, ModelCaller};

const DIAGRAM_SYSTEM_PROMPT: &str = "You are a Solidity architect who draws contract flow \
diagrams as graphs. Reply with a single JSON object and nothing else.";

const GRAPH_FORMAT: &str = "{\"nodes\": [{\"id\": \"n1\", \"label\": \"...\", \"type\": \
\"function|state|external|event|condition\"}], \"edges\": [{\"source\": \"n1\", \"target\": \
\"n2\", \"label\": \"...\"}]}";

/// Node identifier; models emit either strings or integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Number(i64),
    Text(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramEdge {
    #[serde(alias = "from")]
    pub source: NodeId,
    #[serde(alias = "to")]
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A graph of nodes and edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagramData {
    #[serde(default)]
    pub nodes: Vec<DiagramNode>,
    #[serde(default)]
    pub edges: Vec<DiagramEdge>,
}

impl DiagramData {
    /// A diagram can be drawn only with at least one node and one edge.
    pub fn is_renderable(&self) -> bool {
        !self.nodes.is_empty() && !self.edges.is_empty()
    }
}

impl BatchRecord for DiagramData {
    fn from_response(value: Value) -> Option<Self> {
        serde_json::from_value::<DiagramData>(value)
            .ok()
            .filter(|diagram| !diagram.nodes.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramReport {
    pub general: Option<DiagramData>,
    pub functions: IndexMap<String, DiagramData>,
    pub overall_success: bool,
    pub failed_batches: Vec<usize>,
}

impl DiagramReport {
    /// Whether any diagram, general or per-function, can be drawn.
    pub fn is_renderable(&self) -> bool {
        self.general.as_ref().is_some_and(DiagramData::is_renderable)
            || self.functions.values().any(DiagramData::is_renderable)
    }
}

/// Diagram pipeline over already documented functions.
pub struct DiagramAnalyzer {
    caller: ModelCaller,
    batch_size: usize,
    sink: Option<Arc<dyn EventSink>>,
}

impl DiagramAnalyzer {
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

    fn sink(&self) -> Arc<dyn EventSink> {
        self.sink.clone().unwrap_or_else(|| self.caller.sink())
    }

    /// Draw the general diagram, then one diagram per described function.
    ///
    /// The function names are the keys of `descriptions`. A failed general
    /// diagram leaves `general` empty without affecting the batches.
    pub async fn analyze(
        &self,
        source: &str,
        abi: &Value,
        descriptions: &IndexMap<String, FunctionAnalysis>,
    ) -> DiagramReport {
        let abi_text = abi.to_string();
        let general = self.general_diagram(source, &abi_text).await;

        let names: Vec<String> = descriptions.keys().cloned().collect();
        let accumulator = BatchRunner::new(&self.caller, "diagram")
            .with_batch_size(self.batch_size)
            .with_sink(self.sink())
            .run::<DiagramData, _>(&names, |batch| {
                vec![
                    ChatMessage::system(DIAGRAM_SYSTEM_PROMPT),
                    ChatMessage::user(function_diagram_prompt(
                        source,
                        &abi_text,
                        batch,
                        descriptions,
                    )),
                ]
            })
            .await;

        let (functions, overall_success, failed_batches) = accumulator.into_parts();
        let report = DiagramReport {
            general,
            functions,
            overall_success,
            failed_batches,
        };
        info!(
            general = report.general.is_some(),
            functions = report.functions.len(),
            renderable = report.is_renderable(),
            "diagram analysis complete"
        );
        report
    }

    async fn general_diagram(&self, source: &str, abi: &str) -> Option<DiagramData> {
        let label = "diagram general";
        let text = self
            .caller
            .call_or_none(
                label,
                vec![
                    ChatMessage::system(DIAGRAM_SYSTEM_PROMPT),
                    ChatMessage::user(general_diagram_prompt(source, abi)),
                ],
            )
            .await?;

        let extractor = StructuredExtractor::new(label).with_sink(self.sink());
        match extractor.extract::<DiagramData>(&text, ExpectedShape::Object) {
            ExtractionOutcome::Extracted { value, .. } => Some(value),
            ExtractionOutcome::Failed { reason } => {
                warn!(label, reason = %reason, "general diagram extraction failed");
                None
            }
        }
    }
}

pub fn general_diagram_prompt(source: &str, abi: &str) -> String {
    format!(
        "Draw the overall flow of the contract below: its entry points, the state they touch \
and the external calls they make.\n\n\
Return JSON in exactly this format:\n{format}\n\n\
Source:\n{source}\n\n\
ABI:\n{abi}",
        format = GRAPH_FORMAT,
        source = source.trim(),
        abi = abi
    )
}

/// Instruction naming exactly the functions of one batch, with their
/// descriptions for context.
pub fn function_diagram_prompt(
    source: &str,
    abi: &str,
    batch: &AnalysisBatch,
    descriptions: &IndexMap<String, FunctionAnalysis>,
) -> String {
    let described: Vec<String> = batch
        .member_names
        .iter()
        .map(|name| match descriptions.get(name) {
            Some(analysis) if !analysis.description.is_empty() => {
                format!("- {}: {}", name, analysis.description)
            }
            _ => format!("- {}", name),
        })
        .collect();

    format!(
        "Draw the internal flow of ONLY these functions of the contract below:\n{functions}\n\n\
Return a JSON object keyed by function name, each value in this format:\n{format}\n\
If you cannot draw them, return {{\"error\": \"<reason>\"}}.\n\n\
Source:\n{source}\n\n\
ABI:\n{abi}",
        functions = described.join("\n"),
        format = GRAPH_FORMAT,
        source = source.trim(),
        abi = abi
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::ScriptedClient;
    use serde_json::json;

    fn graph() -> Value {
        json!({
            "nodes": [{"id": 1, "label": "start"}, {"id": "end", "label": "end", "type": "state"}],
            "edges": [{"from": 1, "to": "end", "label": "writes"}]
        })
    }

    fn descriptions(names: &[&str]) -> IndexMap<String, FunctionAnalysis> {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    FunctionAnalysis {
                        description: format!("{} things", n),
                        ..FunctionAnalysis::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_diagram_parsing_accepts_aliases() {
        let diagram: DiagramData = serde_json::from_value(graph()).unwrap();
        assert!(diagram.is_renderable());
        assert_eq!(diagram.edges[0].source, NodeId::Number(1));
        assert_eq!(diagram.edges[0].target.to_string(), "end");
        assert_eq!(diagram.nodes[1].kind.as_deref(), Some("state"));

        let serialized = serde_json::to_value(&diagram).unwrap();
        assert_eq!(serialized["edges"][0]["source"], json!(1));
    }

    #[test]
    fn test_empty_edges_not_renderable() {
        let diagram = DiagramData {
            nodes: vec![DiagramNode {
                id: NodeId::Text("a".to_string()),
                label: "a".to_string(),
                kind: None,
                extra: IndexMap::new(),
            }],
            edges: vec![],
        };
        assert!(!diagram.is_renderable());
        assert!(!DiagramReport::default().is_renderable());
    }

    #[tokio::test]
    async fn test_general_failure_is_not_fatal() {
        let per_function = json!({"mint": graph(), "burn": graph()});
        let client = Arc::new(ScriptedClient::new(vec![
            Err(Error::LLM("boom".to_string())),
            Ok(per_function.to_string()),
        ]));
        let analyzer = DiagramAnalyzer::new(ModelCaller::new(client.clone()));

        let report = analyzer
            .analyze("contract A {}", &json!([]), &descriptions(&["mint", "burn"]))
            .await;

        assert!(report.general.is_none());
        assert_eq!(report.functions.len(), 2);
        assert!(report.is_renderable());
        assert!(report.overall_success);

        let prompts = client.prompts();
        assert!(prompts[1].contains("- mint: mint things"));
    }

    #[tokio::test]
    async fn test_general_only() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(format!(
            "```json\n{}\n```",
            graph()
        ))]));
        let analyzer = DiagramAnalyzer::new(ModelCaller::new(client.clone()));

        let report = analyzer
            .analyze("contract A {}", &json!([]), &IndexMap::new())
            .await;

        assert!(report.general.as_ref().is_some_and(DiagramData::is_renderable));
        assert!(report.functions.is_empty());
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_renderable() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(r#"{"nodes": [], "edges": []}"#.to_string()),
            Ok(r#"{"error": "unable"}"#.to_string()),
        ]));
        let analyzer = DiagramAnalyzer::new(ModelCaller::new(client));

        let report = analyzer
            .analyze("contract A {}", &json!([]), &descriptions(&["mint"]))
            .await;

        assert!(!report.is_renderable());
        assert!(!report.overall_success);
    }
}
