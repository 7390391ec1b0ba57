//! Error types for the completion loop and its collaborators
//!
//! Errors are grouped by where they originate: the tool registry, the
//! conversation transcript, the token budget, and the completion endpoint.
//! Only completion and budget failures ever leave a running loop; registry and
//! tool failures are downgraded to tool-result turns the model can read.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Completion request failed: {0}")]
    Completion(#[from] CompletionError),
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
    #[error("Tool not found: {0}")]
    ToolNotFound(String),
    #[error("Invalid parameter schema for tool '{tool_name}': {message}")]
    InvalidToolSchema { tool_name: String, message: String },
    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    InvalidArguments { tool_name: String, message: String },
    #[error("Tool execution failed for '{tool_name}': {message}")]
    ToolExecution { tool_name: String, message: String },
    #[error("Token budget exceeded: estimated {estimated} tokens, limit {limit}")]
    BudgetExceeded { estimated: usize, limit: usize },
    #[error("Conversation violation: {0}")]
    ConversationViolation(#[from] ConversationError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Completion(CompletionError::from(err))
    }
}

/// Failure reported by a completion endpoint, after any retries it applies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

impl CompletionError {
    /// Transport failures, timeouts, rate limits and server errors are worth
    /// another attempt; client errors and unparseable bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Transport(_) => true,
            CompletionError::Api { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            CompletionError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CompletionError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            CompletionError::Api {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

/// Misuse of the transcript API. These indicate a bug in the caller, never a
/// model mistake, and are fatal to the loop that triggers them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    #[error("tool result references unknown tool call id '{0}'")]
    UnknownToolCall(String),
    #[error("tool call '{0}' has already been answered")]
    AlreadyAnswered(String),
    #[error("tool call id '{0}' is already used in this transcript")]
    DuplicateToolCallId(String),
    #[error("{0} tool request(s) from the previous assistant turn are still unanswered")]
    UnansweredToolRequests(usize),
}
