use axum::extract::State;
use axum::Json;

use crate::schema::HealthResponse;
use crate::state::AppState;

/// Reports the tools and model resolved at startup.
///
/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let tools = &state.tools;
    Json(HealthResponse {
        status: if tools.has_compiler() { "ok" } else { "degraded" },
        compiler_available: tools.has_compiler(),
        flattener_available: tools.has_flattener(),
        solc: tools.solc.as_ref().map(|p| p.display().to_string()),
        flattener: tools.flattener.as_ref().map(|p| p.display().to_string()),
        model: state.caller.as_ref().map(|c| c.provider().to_string()),
    })
}
