//! Binary entrypoint for the solgen HTTP server.
//!
//! Reads configuration from environment variables:
//! - `SOLGEN_PORT`: Server listen port (default: "3000")
//! - `RUST_LOG`: Log filter (default: "info")
//! - `SOLGEN_*`, `SOLC_BINARY`, `FORGE_BINARY`, `LLM_*`: see `solgen-core`

use solgen_server::router::build_router;
use solgen_server::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("SOLGEN_PORT").unwrap_or_else(|_| "3000".to_string());

    let state = AppState::from_env();
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("solgen server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
