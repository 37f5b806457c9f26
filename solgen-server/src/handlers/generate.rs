//! Generation and refinement handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use solgen_core::{GeneratedContractResult, GenerationRequest};

use crate::error::ApiError;
use crate::schema::{GenerateFailure, GenerateRequest, GenerateResponse, RefineRequest};
use crate::state::AppState;

/// Generates a contract from a prose description.
///
/// `POST /generate`
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }
    run(
        &state,
        GenerationRequest::Fresh {
            prompt: request.prompt,
        },
    )
    .await
}

/// Modifies an existing contract according to a prose description.
///
/// `POST /refine`
pub async fn refine(
    State(state): State<AppState>,
    Json(request): Json<RefineRequest>,
) -> Result<Response, ApiError> {
    if request.source.trim().is_empty() {
        return Err(ApiError::BadRequest("source must not be empty".to_string()));
    }
    if request.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".to_string()));
    }
    run(
        &state,
        GenerationRequest::Refine {
            source: request.source,
            prompt: request.prompt,
        },
    )
    .await
}

async fn run(state: &AppState, request: GenerationRequest) -> Result<Response, ApiError> {
    let result = state
        .orchestrator()?
        .run(request)
        .await
        .map_err(|e| ApiError::from(e).context("Contract generation failed"))?;
    Ok(into_response(result))
}

fn into_response(result: GeneratedContractResult) -> Response {
    match (result.abi, result.bytecode) {
        (Some(abi), Some(bytecode)) if result.diagnostics.errors.is_empty() => {
            Json(GenerateResponse {
                source: result.source,
                contract_name: result.contract_name,
                abi,
                bytecode,
                warnings: result.diagnostics.warnings,
                attempts: result.attempts_used,
            })
            .into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(GenerateFailure {
                source: result.source,
                errors: result.diagnostics.errors,
                warnings: result.diagnostics.warnings,
                attempts: result.attempts_used,
            }),
        )
            .into_response(),
    }
}
