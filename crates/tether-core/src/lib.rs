//! Bounded, tool-augmented completion loop.
//!
//! A caller seeds a transcript, registers the tools the model may use and
//! hands both to an [`AgenticLoop`]. The loop alternates model calls with
//! tool execution until the model answers, or until the iteration ceiling
//! forces a final tool-less call.
//!
//! # Modules
//!
//! - **agent**: the loop controller and its request/result types
//! - **tools**: tool definitions, the registry and per-call context
//! - **conversation**: transcript invariants and token budgeting
//! - **llm**: the completion client contract, retries and the HTTP provider
//! - **metrics**: per-call tool execution records
//! - **config** and **logging**: YAML configuration and logger setup

pub mod agent;
pub mod config;
pub mod conversation;
pub mod core_types;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod tools;

pub use agent::{AgenticLoop, LoopOutcome, LoopRequest, LoopResult, ToolDispatch};
pub use config::*;
pub use conversation::{Conversation, TokenBudget};
pub use core_types::{Role, ToolRequest, Turn, Usage};
pub use errors::{AgentError, CompletionError};
pub use llm::CompletionClient;
pub use metrics::{MetricsLedger, ToolExecutionRecord};
pub use tools::{Capability, ToolContext, ToolDefinition, ToolRegistry};

#[cfg(test)]
pub mod test_utils;
