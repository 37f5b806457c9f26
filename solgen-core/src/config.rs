//! Pipeline configuration and external tool discovery.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{RetryPolicy, DEFAULT_BACKOFF_MS, DEFAULT_BATCH_SIZE, DEFAULT_PIPELINE_RETRIES};
use crate::compiler::{Compiler, CompilerSettings, SolcCompiler};
use crate::flatten::{CommandFlattener, Flattener, PassthroughFlattener};
use crate::generate::DEFAULT_MAX_ATTEMPTS;

const SOLC_COMMON_PATHS: [&str; 4] = [
    "/usr/local/bin/solc",
    "/usr/bin/solc",
    "/opt/homebrew/bin/solc",
    "~/.solc-select/usr/bin/solc",
];

const FORGE_COMMON_PATHS: [&str; 3] = [
    "~/.foundry/bin/forge",
    "/usr/local/bin/forge",
    "/opt/homebrew/bin/forge",
];

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "ignoring unparsable value");
            default
        }),
        Err(_) => default,
    }
}

/// Tunables shared by the generation and analysis pipelines.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub max_attempts: u32,
    pub batch_size: usize,
    /// Whole-pipeline attempts for the analysis endpoints
    pub pipeline_retries: u32,
    pub backoff_ms: u64,
    /// Directory for temporary compilation units
    pub work_dir: PathBuf,
    pub compiler: CompilerSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            batch_size: DEFAULT_BATCH_SIZE,
            pipeline_retries: DEFAULT_PIPELINE_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
            work_dir: std::env::temp_dir(),
            compiler: CompilerSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Create configuration from `SOLGEN_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_or("SOLGEN_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            batch_size: env_or("SOLGEN_BATCH_SIZE", defaults.batch_size).max(1),
            pipeline_retries: env_or("SOLGEN_PIPELINE_RETRIES", defaults.pipeline_retries).max(1),
            backoff_ms: env_or("SOLGEN_BACKOFF_MS", defaults.backoff_ms),
            work_dir: std::env::var("SOLGEN_WORK_DIR")
                .map(|dir| PathBuf::from(shellexpand::tilde(&dir).as_ref()))
                .unwrap_or(defaults.work_dir),
            compiler: defaults.compiler,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.pipeline_retries, Duration::from_millis(self.backoff_ms))
    }
}

/// External binaries resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolCapabilities {
    pub solc: Option<PathBuf>,
    pub flattener: Option<PathBuf>,
}

/// Resolve a binary: explicit override, then PATH, then common install paths.
pub fn find_binary(name: &str, override_path: Option<&str>, common_paths: &[&str]) -> Option<PathBuf> {
    if let Some(path) = override_path.filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(shellexpand::tilde(path).as_ref()));
    }

    if let Ok(path) = which::which(name) {
        return Some(path);
    }

    common_paths
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists())
}

impl ToolCapabilities {
    /// Detect `solc` and `forge`, honoring `SOLC_BINARY` and `FORGE_BINARY`.
    pub fn detect() -> Self {
        let solc_override = std::env::var("SOLC_BINARY").ok();
        let forge_override = std::env::var("FORGE_BINARY").ok();
        let capabilities = Self {
            solc: find_binary("solc", solc_override.as_deref(), &SOLC_COMMON_PATHS),
            flattener: find_binary("forge", forge_override.as_deref(), &FORGE_COMMON_PATHS),
        };

        match &capabilities.solc {
            Some(path) => info!(solc = %path.display(), "compiler found"),
            None => warn!("solc not found; set SOLC_BINARY or install solc"),
        }
        match &capabilities.flattener {
            Some(path) => info!(forge = %path.display(), "flattener found"),
            None => info!("forge not found; sources will be compiled without flattening"),
        }
        capabilities
    }

    pub fn has_compiler(&self) -> bool {
        self.solc.is_some()
    }

    pub fn has_flattener(&self) -> bool {
        self.flattener.is_some()
    }

    /// Compiler adapter; an undetected solc is looked up on PATH at spawn
    /// time and fails there.
    pub fn compiler(&self) -> Arc<dyn Compiler> {
        let binary = self.solc.as_deref().unwrap_or(Path::new("solc"));
        Arc::new(SolcCompiler::new(binary))
    }

    /// `forge flatten` when available, otherwise sources pass through.
    pub fn flattener(&self) -> Arc<dyn Flattener> {
        match &self.flattener {
            Some(binary) => Arc::new(CommandFlattener::new(binary.clone())),
            None => Arc::new(PassthroughFlattener),
        }
    }
}
