//! Bounded tool-augmented completion loop.
//!
//! [`AgenticLoop`] alternates between asking the model for a completion and
//! executing the tools it requests, until the model answers without tools or
//! the iteration ceiling is reached. At the ceiling one last call is made with
//! no tool catalog, and whatever text comes back is the answer.
//!
//! Tool failures of any kind are reported to the model as tool results and
//! never end the loop. Completion errors do, as do budget errors when the
//! budget is configured to fail.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::TetherConfig;
use crate::conversation::{
    default_counter, Conversation, TokenBudget, TokenCounter, TOOL_ERROR_PREFIX,
};
use crate::core_types::{ToolRequest, Turn, Usage};
use crate::errors::AgentError;
use crate::llm::{create_client, CompletionClient, CompletionOptions, ReasoningEffort};
use crate::metrics::{MetricsLedger, ToolExecutionRecord};
use crate::tools::{render_output, ToolContext, ToolRegistry};

/// Appended as a user turn before the final, tool-less call.
pub const FORCED_COMPLETION_INSTRUCTION: &str = "You have reached the limit of tool calls for this task. \
Do not request any more tools. Using the information gathered so far, provide your final answer now.";

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// How the requests of one assistant turn are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolDispatch {
    #[default]
    Sequential,
    /// Run the batch concurrently; results are still appended in request order.
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The model answered without requesting tools.
    Completed,
    /// The iteration ceiling was hit and the answer came from the tool-less call.
    ForcedCompletion,
}

#[derive(Debug, Clone)]
pub struct LoopRequest {
    pub initial_turns: Vec<Turn>,
    pub model: String,
    pub max_iterations: usize,
    pub token_budget: Option<TokenBudget>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub context: ToolContext,
}

impl LoopRequest {
    pub fn new(initial_turns: Vec<Turn>, model: impl Into<String>) -> Self {
        Self {
            initial_turns,
            model: model.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            token_budget: None,
            reasoning_effort: None,
            context: ToolContext::default(),
        }
    }

    /// Request populated from the `agent` and `token_budget` sections.
    pub fn from_config(config: &TetherConfig, initial_turns: Vec<Turn>) -> Self {
        Self {
            initial_turns,
            model: config.model().to_string(),
            max_iterations: config.agent.max_iterations,
            token_budget: config.token_budget.clone(),
            reasoning_effort: config.agent.reasoning_effort,
            context: config.agent.tool_context(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_token_budget(mut self, budget: TokenBudget) -> Self {
        self.token_budget = Some(budget);
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub fn with_context(mut self, context: ToolContext) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoopResult {
    pub final_text: String,
    /// Tool-exposing model calls made. The forced call is not counted.
    pub iterations_used: usize,
    /// Tool calls that completed successfully.
    pub total_tool_calls_executed: usize,
    pub transcript: Vec<Turn>,
    pub metrics: MetricsLedger,
    pub outcome: LoopOutcome,
    /// Summed token usage, if the client reported any.
    pub usage: Option<Usage>,
}

impl LoopResult {
    pub fn was_forced(&self) -> bool {
        self.outcome == LoopOutcome::ForcedCompletion
    }
}

#[derive(Debug)]
enum LoopState {
    /// Tool-exposing calls made so far.
    Running(usize),
    AwaitingToolResults(usize, Vec<ToolRequest>),
    Completed(LoopResult),
    ForcedCompletion(LoopResult),
}

/// Everything one invocation owns.
struct Invocation {
    conversation: Conversation,
    metrics: MetricsLedger,
    usage: Option<Usage>,
    tool_calls_executed: usize,
    model: String,
    max_iterations: usize,
    token_budget: Option<TokenBudget>,
    reasoning_effort: Option<ReasoningEffort>,
    context: ToolContext,
}

impl Invocation {
    fn new(request: LoopRequest, counter: Arc<dyn TokenCounter>) -> Result<Self, AgentError> {
        Ok(Self {
            conversation: Conversation::from_turns(request.initial_turns, counter)?,
            metrics: MetricsLedger::new(),
            usage: None,
            tool_calls_executed: 0,
            model: request.model,
            max_iterations: request.max_iterations,
            token_budget: request.token_budget,
            reasoning_effort: request.reasoning_effort,
            context: request.context,
        })
    }

    fn record_usage(&mut self, usage: Option<Usage>) {
        if let Some(usage) = usage {
            self.usage.get_or_insert_with(Usage::default).accumulate(&usage);
        }
    }

    fn enforce_budget(&mut self) -> Result<(), AgentError> {
        if let Some(budget) = &self.token_budget {
            self.conversation.apply_token_budget(budget)?;
        }
        Ok(())
    }

    fn finish(
        &mut self,
        final_text: String,
        iterations_used: usize,
        outcome: LoopOutcome,
    ) -> LoopResult {
        let emptied = Conversation::with_counter(self.conversation.counter());
        LoopResult {
            final_text,
            iterations_used,
            total_tool_calls_executed: self.tool_calls_executed,
            transcript: std::mem::replace(&mut self.conversation, emptied).into_turns(),
            metrics: std::mem::take(&mut self.metrics),
            outcome,
            usage: self.usage,
        }
    }
}

pub struct AgenticLoop {
    client: Arc<dyn CompletionClient>,
    registry: Arc<ToolRegistry>,
    dispatch: ToolDispatch,
    counter: Arc<dyn TokenCounter>,
}

impl AgenticLoop {
    pub fn new(client: Arc<dyn CompletionClient>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            registry,
            dispatch: ToolDispatch::default(),
            counter: default_counter(),
        }
    }

    /// Build the configured client and wrap it around `registry`.
    pub fn from_config(
        config: &TetherConfig,
        registry: Arc<ToolRegistry>,
    ) -> Result<Self, AgentError> {
        let client = create_client(&config.llm, &config.retry)?;
        Ok(Self::new(client, registry).with_dispatch(config.agent.tool_dispatch))
    }

    pub fn with_dispatch(mut self, dispatch: ToolDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn dispatch(&self) -> ToolDispatch {
        self.dispatch
    }

    pub async fn run(&self, request: LoopRequest) -> Result<LoopResult, AgentError> {
        log::info!(
            "Loop started: model={}, max_iterations={}, tools={}",
            request.model,
            request.max_iterations,
            self.registry.tool_count()
        );

        let mut run = Invocation::new(request, self.counter.clone())?;

        let mut state = LoopState::Running(0);
        loop {
            state = match state {
                LoopState::Running(used) if used >= run.max_iterations => {
                    self.force_completion(&mut run, used).await?
                }
                LoopState::Running(used) => self.step(&mut run, used + 1).await?,
                LoopState::AwaitingToolResults(iteration, pending) => {
                    self.execute_pending(&mut run, iteration, pending).await?;
                    LoopState::Running(iteration)
                }
                LoopState::Completed(result) | LoopState::ForcedCompletion(result) => {
                    log::info!(
                        "Loop finished ({:?}) after {} iteration(s), {} tool call(s) executed",
                        result.outcome,
                        result.iterations_used,
                        result.total_tool_calls_executed
                    );
                    return Ok(result);
                }
            };
        }
    }

    /// One tool-exposing model call.
    async fn step(&self, run: &mut Invocation, iteration: usize) -> Result<LoopState, AgentError> {
        log::info!("Iteration {}/{}", iteration, run.max_iterations);
        run.enforce_budget()?;

        let options = CompletionOptions::new(run.model.clone())
            .with_reasoning_effort(run.reasoning_effort)
            .with_tools(self.registry.describe_all());
        let response = self
            .client
            .complete(run.conversation.snapshot(), options)
            .await?;
        run.record_usage(response.usage);

        if response.is_final() {
            let final_text = response.content.clone().unwrap_or_default();
            if final_text.is_empty() {
                log::warn!("Model returned neither text nor tool requests");
            }
            run.conversation.append_assistant(response.content, Vec::new())?;
            return Ok(LoopState::Completed(run.finish(
                final_text,
                iteration,
                LoopOutcome::Completed,
            )));
        }

        let requests = self.normalize_ids(&run.conversation, response.tool_requests);
        log::info!(
            "Model requested {} tool call(s): {:?}",
            requests.len(),
            requests.iter().map(|r| r.tool_name.as_str()).collect::<Vec<_>>()
        );
        run.conversation
            .append_assistant(response.content, requests.clone())?;
        Ok(LoopState::AwaitingToolResults(iteration, requests))
    }

    async fn execute_pending(
        &self,
        run: &mut Invocation,
        iteration: usize,
        pending: Vec<ToolRequest>,
    ) -> Result<(), AgentError> {
        let context = &run.context;
        let outcomes: Vec<(Result<Value, AgentError>, Duration)> = match self.dispatch {
            ToolDispatch::Sequential => {
                let mut outcomes = Vec::with_capacity(pending.len());
                for request in &pending {
                    outcomes.push(self.dispatch_one(request, context).await);
                }
                outcomes
            }
            ToolDispatch::Concurrent => {
                join_all(pending.iter().map(|request| self.dispatch_one(request, context))).await
            }
        };

        for (request, (result, elapsed)) in pending.into_iter().zip(outcomes) {
            let text = match result {
                Ok(value) => {
                    run.tool_calls_executed += 1;
                    run.metrics.record(ToolExecutionRecord::success(
                        &request.tool_name,
                        &request.id,
                        iteration,
                        elapsed,
                    ));
                    render_output(&value)
                }
                Err(e) => {
                    log::warn!("Tool call {} ({}) failed: {}", request.id, request.tool_name, e);
                    let message = e.to_string();
                    run.metrics.record(ToolExecutionRecord::failure(
                        &request.tool_name,
                        &request.id,
                        iteration,
                        elapsed,
                        message.clone(),
                    ));
                    format!("{}{}", TOOL_ERROR_PREFIX, message)
                }
            };
            run.conversation
                .append_tool_result(request.id, text, request.tool_name)?;
        }
        Ok(())
    }

    async fn dispatch_one(
        &self,
        request: &ToolRequest,
        context: &ToolContext,
    ) -> (Result<Value, AgentError>, Duration) {
        let started = Instant::now();
        let result = match parse_arguments(&request.raw_arguments) {
            Ok(arguments) => {
                log::debug!("Executing tool {} ({})", request.tool_name, request.id);
                self.registry
                    .execute(&request.tool_name, arguments, context)
                    .await
            }
            Err(message) => Err(AgentError::InvalidArguments {
                tool_name: request.tool_name.clone(),
                message,
            }),
        };
        (result, started.elapsed())
    }

    /// The final call, made without a tool catalog.
    async fn force_completion(
        &self,
        run: &mut Invocation,
        used: usize,
    ) -> Result<LoopState, AgentError> {
        log::warn!(
            "Reached max_iterations ({}), requesting a final answer without tools",
            run.max_iterations
        );
        run.conversation.append_user(FORCED_COMPLETION_INSTRUCTION);
        run.enforce_budget()?;

        let options = CompletionOptions::new(run.model.clone())
            .with_reasoning_effort(run.reasoning_effort);
        let response = self
            .client
            .complete(run.conversation.snapshot(), options)
            .await?;
        run.record_usage(response.usage);

        if !response.tool_requests.is_empty() {
            log::warn!(
                "Discarding {} tool request(s) from the forced completion",
                response.tool_requests.len()
            );
        }
        let final_text = response.content.unwrap_or_default();
        run.conversation
            .append_assistant(Some(final_text.clone()), Vec::new())?;

        Ok(LoopState::ForcedCompletion(run.finish(
            final_text,
            used,
            LoopOutcome::ForcedCompletion,
        )))
    }

    /// Replace missing or reused request ids so every id in the transcript is unique.
    fn normalize_ids(
        &self,
        conversation: &Conversation,
        requests: Vec<ToolRequest>,
    ) -> Vec<ToolRequest> {
        let mut seen: Vec<String> = Vec::with_capacity(requests.len());
        requests
            .into_iter()
            .map(|mut request| {
                let id = request.id.trim().to_string();
                if id.is_empty() || conversation.is_id_used(&id) || seen.contains(&id) {
                    let fresh = format!("call_{}", Uuid::new_v4());
                    log::warn!(
                        "Replacing unusable tool call id '{}' for {} with {}",
                        request.id,
                        request.tool_name,
                        fresh
                    );
                    request.id = fresh;
                } else {
                    request.id = id;
                }
                seen.push(request.id.clone());
                request
            })
            .collect()
    }
}

/// Empty or blank argument strings mean "no arguments".
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| format!("could not parse arguments as JSON: {}", e))
}
