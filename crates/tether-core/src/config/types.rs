//! Configuration type definitions
//!
//! A minimal file only needs an `llm` section; everything else falls back to
//! serde defaults. Secrets can be left out of the file and resolved from the
//! environment by the loader.

use crate::agent::ToolDispatch;
use crate::conversation::TokenBudget;
use crate::errors::AgentError;
use crate::llm::{ReasoningEffort, RetryConfig};
use crate::tools::ToolContext;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub agent: AgentSettings,
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub token_budget: Option<TokenBudget>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub tool_dispatch: ToolDispatch,
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Overrides `llm.model` for loop invocations.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    /// Hint passed to tools through their context, in seconds.
    #[serde(default)]
    pub tool_timeout: Option<u64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_dispatch: ToolDispatch::default(),
            reasoning_effort: None,
            model: None,
            working_directory: default_working_directory(),
            tool_timeout: None,
        }
    }
}

impl AgentSettings {
    pub fn tool_context(&self) -> ToolContext {
        let context = ToolContext::new(self.working_directory.clone());
        match self.tool_timeout {
            Some(secs) => context.with_timeout(Duration::from_secs(secs)),
            None => context,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    #[serde(default)]
    pub model: String,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub parameters: ModelParameters,
    #[serde(default)]
    pub auth: LlmAuth,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Custom { base_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmAuth {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            colored: default_true(),
        }
    }
}

fn default_max_iterations() -> usize { 10 }
fn default_working_directory() -> PathBuf { PathBuf::from(".") }
fn default_request_timeout_secs() -> u64 { 120 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl TetherConfig {
    /// Model used for loop invocations.
    pub fn model(&self) -> &str {
        self.agent.model.as_deref().unwrap_or(&self.llm.model)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.model().is_empty() {
            return Err(AgentError::ConfigError("LLM model cannot be empty".to_string()));
        }

        if let LlmProvider::Custom { base_url } = &self.llm.provider {
            if base_url.is_empty() {
                return Err(AgentError::ConfigError(
                    "Custom provider requires a valid 'base_url'".to_string(),
                ));
            }
        }

        if self.llm.parameters.request_timeout_secs == 0 {
            return Err(AgentError::ConfigError(
                "llm.parameters.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(AgentError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.retry.backoff_factor < 1.0 {
            return Err(AgentError::ConfigError(format!(
                "retry.backoff_factor must be >= 1.0, got {}",
                self.retry.backoff_factor
            )));
        }

        if let Some(budget) = &self.token_budget {
            budget.validate()?;
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(AgentError::ConfigError(format!(
                "Unknown log level '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }
}
