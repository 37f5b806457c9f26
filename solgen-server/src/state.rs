//! Shared application state.
//!
//! [`AppState`] holds configuration and the injected collaborators. Every
//! request builds its own orchestrator or analyzer from them, so concurrent
//! requests share no mutable state.

use std::sync::Arc;

use solgen_core::{
    client_from_config, ClientConfig, Compiler, DiagramAnalyzer, DocumentationAnalyzer,
    Flattener, GenerationOrchestrator, ModelCaller, PipelineConfig, ToolCapabilities,
};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PipelineConfig>,
    pub tools: Arc<ToolCapabilities>,
    /// `None` when no model client could be configured
    pub caller: Option<ModelCaller>,
    pub compiler: Arc<dyn Compiler>,
    pub flattener: Arc<dyn Flattener>,
}

impl AppState {
    /// Build state from explicit parts; the compiler and flattener come from
    /// `tools`.
    pub fn new(config: PipelineConfig, tools: ToolCapabilities, caller: Option<ModelCaller>) -> Self {
        let compiler = tools.compiler();
        let flattener = tools.flattener();
        Self {
            config: Arc::new(config),
            tools: Arc::new(tools),
            caller,
            compiler,
            flattener,
        }
    }

    /// Build state from environment variables. A missing or invalid model
    /// configuration leaves the model endpoints unavailable.
    pub fn from_env() -> Self {
        let config = PipelineConfig::from_env();
        let tools = ToolCapabilities::detect();
        let caller = match ClientConfig::from_env().and_then(client_from_config) {
            Ok(client) => {
                tracing::info!(provider = %client.provider(), "model client configured");
                Some(ModelCaller::new(client))
            }
            Err(err) => {
                tracing::warn!(error = %err, "model client unavailable");
                None
            }
        };
        Self::new(config, tools, caller)
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_flattener(mut self, flattener: Arc<dyn Flattener>) -> Self {
        self.flattener = flattener;
        self
    }

    pub fn caller(&self) -> Result<&ModelCaller, ApiError> {
        self.caller.as_ref().ok_or_else(|| {
            ApiError::internal(
                "Model client not configured",
                "set LLM_API_KEY or a provider-specific API key",
            )
        })
    }

    pub fn orchestrator(&self) -> Result<GenerationOrchestrator, ApiError> {
        Ok(GenerationOrchestrator::new(
            self.caller()?.clone(),
            Arc::clone(&self.compiler),
            Arc::clone(&self.flattener),
        )
        .with_settings(self.config.compiler.clone())
        .with_work_dir(self.config.work_dir.clone())
        .with_max_attempts(self.config.max_attempts))
    }

    pub fn documentation_analyzer(&self) -> Result<DocumentationAnalyzer, ApiError> {
        Ok(DocumentationAnalyzer::new(self.caller()?.clone()).with_batch_size(self.config.batch_size))
    }

    pub fn diagram_analyzer(&self) -> Result<DiagramAnalyzer, ApiError> {
        Ok(DiagramAnalyzer::new(self.caller()?.clone()).with_batch_size(self.config.batch_size))
    }
}
