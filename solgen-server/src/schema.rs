//! Request and response bodies. Field names are camelCase on the wire.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use solgen_core::analysis::DiagramReport;
use solgen_core::{Diagnostic, FunctionAnalysis};

/// `POST /compile`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub contract_name: Option<String>,
    /// Where the caller keeps the source; relative imports resolve from it
    #[serde(default)]
    pub source_path: Option<PathBuf>,
    /// Also run documentation analysis on success
    #[serde(default)]
    pub analyze: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    pub contract_name: String,
    pub abi: Value,
    pub bytecode: String,
    pub warnings: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_analyses: Option<IndexMap<String, FunctionAnalysis>>,
}

/// Body of a `400` for a source that does not compile.
#[derive(Debug, Clone, Serialize)]
pub struct CompileFailure {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// `POST /generate`
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
}

/// `POST /refine`
#[derive(Debug, Clone, Deserialize)]
pub struct RefineRequest {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub source: String,
    pub contract_name: String,
    pub abi: Value,
    pub bytecode: String,
    pub warnings: Vec<Diagnostic>,
    pub attempts: u32,
}

/// Body of a `400` once the attempt budget is spent.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateFailure {
    pub source: String,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub attempts: u32,
}

/// `POST /generate/documentation`
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentationRequest {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub abi: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationResponse {
    pub function_analyses: IndexMap<String, FunctionAnalysis>,
    pub attempts: u32,
}

/// `POST /generate/diagram`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramRequest {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub abi: Value,
    /// Function name to description (string or analysis object)
    #[serde(default)]
    pub function_descriptions: Option<IndexMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramResponse {
    pub diagram_data: DiagramReport,
    pub attempts: u32,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `degraded` when no compiler was found
    pub status: &'static str,
    pub compiler_available: bool,
    pub flattener_available: bool,
    pub solc: Option<String>,
    pub flattener: Option<String>,
    pub model: Option<String>,
}
