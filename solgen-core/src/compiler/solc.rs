//! `solc --standard-json` subprocess.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::types::{StandardJsonInput, StandardJsonOutput};
use super::Compiler;
use crate::error::{Error, Result};

/// Runs a solc binary over its standard-JSON interface.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    binary: PathBuf,
}

impl SolcCompiler {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl Compiler for SolcCompiler {
    async fn compile_standard_json(&self, input: &StandardJsonInput) -> Result<StandardJsonOutput> {
        let payload = serde_json::to_vec(input)?;

        let mut child = Command::new(&self.binary)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::SubprocessComm(format!(
                    "Failed to start {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::SubprocessComm("Failed to get solc stdin".to_string()))?;
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| Error::SubprocessComm(format!("Failed to write solc input: {}", e)))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::SubprocessComm(format!("Failed to read solc output: {}", e)))?;

        debug!(
            binary = %self.binary.display(),
            status = %output.status,
            stdout_bytes = output.stdout.len(),
            "solc finished"
        );

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Compiler(format!(
                "solc exited with {} and no output: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Compiler(format!("Unreadable solc output: {}", e)))
    }
}
