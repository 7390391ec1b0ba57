//! Completion client contract and provider integrations.
//!
//! The loop talks to a model through one narrow interface: hand over the
//! transcript plus options, get back either text or tool requests. Whether a
//! tool catalog is present in the options is what allows or forbids tool use.
//! Retrying failed calls is the client's business, see [`retry::RetryingClient`].

pub use crate::core_types::{ToolRequest, Turn, Usage};
use crate::errors::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod providers;
pub mod retry;

pub use providers::create_client;
pub use retry::{RetryConfig, RetryingClient};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// `None` means the model may not request tools on this call.
    pub tools: Option<Vec<ToolMetadata>>,
}

impl CompletionOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reasoning_effort: None,
            tools: None,
        }
    }

    pub fn with_reasoning_effort(mut self, effort: Option<ReasoningEffort>) -> Self {
        self.reasoning_effort = effort;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolMetadata>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn allows_tools(&self) -> bool {
        self.tools.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_requests: Vec<ToolRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(content: Option<String>, tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            content,
            tool_requests,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// A response without tool requests is a final answer.
    pub fn is_final(&self) -> bool {
        self.tool_requests.is_empty()
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        transcript: Vec<Turn>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, AgentError>;
}
