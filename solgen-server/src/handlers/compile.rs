//! Compilation handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{info, warn};

use solgen_core::generate::extract_contract_name;
use solgen_core::{compile, prepare_compilation_unit};

use crate::error::ApiError;
use crate::schema::{CompileFailure, CompileRequest, CompileResponse};
use crate::state::AppState;

/// Compiles a source and selects the requested contract.
///
/// Diagnostics with errors are a `400`; optional documentation is best
/// effort and never fails the compile.
///
/// `POST /compile`
pub async fn compile_source(
    State(state): State<AppState>,
    Json(request): Json<CompileRequest>,
) -> Result<Response, ApiError> {
    if request.source.trim().is_empty() {
        return Err(ApiError::BadRequest("source must not be empty".to_string()));
    }

    let contract_name = request
        .contract_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| extract_contract_name(&request.source));

    let settings = &state.config.compiler;
    let prepared = prepare_compilation_unit(
        state.flattener.as_ref(),
        &request.source,
        settings,
        &state.config.work_dir,
        request.source_path.as_deref(),
    )
    .await;

    let outcome = compile(state.compiler.as_ref(), settings, &prepared.source, &contract_name)
        .await
        .map_err(|e| ApiError::from(e).context("Compilation failed"))?;

    let (diagnostics, artifact) = outcome.into_parts();
    let Some(artifact) = artifact else {
        info!(
            contract = %contract_name,
            errors = diagnostics.errors.len(),
            "compilation reported errors"
        );
        let body = CompileFailure {
            errors: diagnostics.errors,
            warnings: diagnostics.warnings,
        };
        return Ok((StatusCode::BAD_REQUEST, Json(body)).into_response());
    };

    let function_analyses = if request.analyze {
        match state.documentation_analyzer() {
            Ok(analyzer) => {
                let report = analyzer.analyze(&request.source, &artifact.abi).await;
                (!report.analyses.is_empty()).then_some(report.analyses)
            }
            Err(err) => {
                warn!(error = %err, "skipping analysis");
                None
            }
        }
    } else {
        None
    };

    Ok(Json(CompileResponse {
        contract_name: artifact.name,
        abi: artifact.abi,
        bytecode: artifact.bytecode,
        warnings: diagnostics.warnings,
        function_analyses,
    })
    .into_response())
}
