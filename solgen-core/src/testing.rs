//! Scripted collaborators shared by unit tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::compiler::{Compiler, StandardJsonInput, StandardJsonOutput};
use crate::error::{Error, Result};
use crate::flatten::Flattener;
use crate::llm::{CompletionRequest, CompletionResponse, LLMClient, Provider};

/// LLM client answering from a fixed script, recording every request.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Text of the last user message of each request.
    pub fn prompts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl LLMClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(CompletionResponse::text(text)),
            Some(Err(err)) => Err(err),
            None => Err(Error::LLM("script exhausted".to_string())),
        }
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}

/// Compiler answering from a fixed script, recording every input.
pub struct ScriptedCompiler {
    script: Mutex<VecDeque<Result<StandardJsonOutput>>>,
    inputs: Mutex<Vec<StandardJsonInput>>,
}

impl ScriptedCompiler {
    pub fn new(script: Vec<Result<StandardJsonOutput>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<StandardJsonInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Compiler for ScriptedCompiler {
    async fn compile_standard_json(&self, input: &StandardJsonInput) -> Result<StandardJsonOutput> {
        self.inputs.lock().unwrap().push(input.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(Error::Compiler("script exhausted".to_string())))
    }
}

/// Flattener with a fixed answer, recording staged paths and their contents.
pub struct ScriptedFlattener {
    answer: std::result::Result<String, String>,
    staged: Mutex<Vec<(PathBuf, Option<String>)>>,
    originals: Mutex<Vec<Option<PathBuf>>>,
}

impl ScriptedFlattener {
    pub fn succeeding(output: impl Into<String>) -> Self {
        Self {
            answer: Ok(output.into()),
            staged: Mutex::new(Vec::new()),
            originals: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            answer: Err(message.into()),
            staged: Mutex::new(Vec::new()),
            originals: Mutex::new(Vec::new()),
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.staged.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn staged_contents(&self) -> Vec<Option<String>> {
        self.staged.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn original_paths(&self) -> Vec<Option<PathBuf>> {
        self.originals.lock().unwrap().clone()
    }
}

#[async_trait]
impl Flattener for ScriptedFlattener {
    async fn flatten(
        &self,
        _source: &str,
        path: &Path,
        original_path: Option<&Path>,
    ) -> Result<String> {
        let contents = std::fs::read_to_string(path).ok();
        self.staged.lock().unwrap().push((path.to_path_buf(), contents));
        self.originals
            .lock()
            .unwrap()
            .push(original_path.map(Path::to_path_buf));
        self.answer.clone().map_err(Error::Flatten)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
