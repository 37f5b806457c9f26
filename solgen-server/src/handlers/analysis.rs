//! Documentation and diagram handlers.
//!
//! Each request reruns its whole pipeline with linear backoff until it
//! yields a usable result or the retry budget is spent.

use axum::extract::State;
use axum::Json;
use indexmap::IndexMap;
use serde_json::Value;

use solgen_core::analysis::BatchRecord;
use solgen_core::{retry_with_backoff, Error, FunctionAnalysis};

use crate::error::ApiError;
use crate::schema::{DiagramRequest, DiagramResponse, DocumentationRequest, DocumentationResponse};
use crate::state::AppState;

fn validate(source: &str, abi: &Value) -> Result<(), ApiError> {
    if source.trim().is_empty() {
        return Err(ApiError::BadRequest("source must not be empty".to_string()));
    }
    if !abi.is_array() {
        return Err(ApiError::BadRequest("abi must be a JSON array".to_string()));
    }
    Ok(())
}

/// Caller-supplied descriptions; values that are neither strings nor objects
/// keep the name with an empty description.
fn descriptions_from(raw: IndexMap<String, Value>) -> IndexMap<String, FunctionAnalysis> {
    raw.into_iter()
        .map(|(name, value)| {
            let analysis = FunctionAnalysis::from_response(value).unwrap_or_default();
            (name, analysis)
        })
        .collect()
}

/// Documents every function of a compiled contract.
///
/// `POST /generate/documentation`
pub async fn documentation(
    State(state): State<AppState>,
    Json(request): Json<DocumentationRequest>,
) -> Result<Json<DocumentationResponse>, ApiError> {
    validate(&request.source, &request.abi)?;
    let analyzer = state.documentation_analyzer()?;

    let analyzer = &analyzer;
    let source = request.source.as_str();
    let abi = &request.abi;
    let retried = retry_with_backoff(state.config.retry_policy(), "documentation", move |_| async move {
        let report = analyzer.analyze(source, abi).await;
        if report.is_total_failure() {
            return Err(Error::Extraction(format!(
                "no documentation for any of {} function(s)",
                report.function_names.len()
            )));
        }
        Ok(report)
    })
    .await
    .map_err(|e| ApiError::from(e).context("Failed to generate documentation"))?;

    Ok(Json(DocumentationResponse {
        function_analyses: retried.value.analyses,
        attempts: retried.attempts,
    }))
}

/// Draws a general flow diagram and one diagram per function.
///
/// Without `functionDescriptions` the functions are documented first and
/// the documented names are diagrammed.
///
/// `POST /generate/diagram`
pub async fn diagram(
    State(state): State<AppState>,
    Json(request): Json<DiagramRequest>,
) -> Result<Json<DiagramResponse>, ApiError> {
    validate(&request.source, &request.abi)?;
    let diagrams = state.diagram_analyzer()?;
    let documentation = state.documentation_analyzer()?;
    let supplied = request
        .function_descriptions
        .filter(|descriptions| !descriptions.is_empty())
        .map(descriptions_from);

    let (diagrams, documentation, supplied) = (&diagrams, &documentation, &supplied);
    let source = request.source.as_str();
    let abi = &request.abi;
    let retried = retry_with_backoff(state.config.retry_policy(), "diagram", move |_| async move {
        let documented;
        let descriptions = match supplied {
            Some(descriptions) => descriptions,
            None => {
                documented = documentation.analyze(source, abi).await.analyses;
                &documented
            }
        };

        let report = diagrams.analyze(source, abi, descriptions).await;
        if !report.is_renderable() {
            return Err(Error::Extraction(
                "no diagram with both nodes and edges".to_string(),
            ));
        }
        Ok(report)
    })
    .await
    .map_err(|e| ApiError::from(e).context("Failed to generate diagram"))?;

    Ok(Json(DiagramResponse {
        diagram_data: retried.value,
        attempts: retried.attempts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptions_from_mixed_values() {
        let raw: IndexMap<String, Value> = serde_json::from_value(json!({
            "mint": "Creates tokens",
            "burn": {"description": "Destroys tokens"},
            "pause": 3
        }))
        .unwrap();

        let descriptions = descriptions_from(raw);
        assert_eq!(descriptions["mint"].description, "Creates tokens");
        assert_eq!(descriptions["burn"].description, "Destroys tokens");
        assert_eq!(descriptions["pause"].description, "");
        assert_eq!(descriptions.len(), 3);
    }

    #[test]
    fn test_validate() {
        assert!(validate("", &json!([])).is_err());
        assert!(validate("contract A {}", &json!({})).is_err());
        assert!(validate("contract A {}", &json!([])).is_ok());
    }
}
