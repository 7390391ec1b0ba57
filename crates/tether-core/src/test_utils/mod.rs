pub mod mock_llm_server;

use crate::core_types::Turn;
use crate::errors::{AgentError, CompletionError};
use crate::llm::{CompletionClient, CompletionOptions, CompletionResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Completion client that replays a fixed script and records every call.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<CompletionResponse, AgentError>>>,
    calls: Mutex<Vec<(Vec<Turn>, CompletionOptions)>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Result<CompletionResponse, AgentError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(responses: Vec<CompletionResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn calls(&self) -> Vec<(Vec<Turn>, CompletionOptions)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        transcript: Vec<Turn>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, AgentError> {
        self.calls.lock().unwrap().push((transcript, options));
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(CompletionError::Transport("script exhausted".to_string()).into())
        })
    }
}
