use crate::config::LlmConfig;
use crate::core_types::{Role, ToolRequest, Turn, Usage};
use crate::errors::{AgentError, CompletionError};
use crate::llm::{CompletionClient, CompletionOptions, CompletionResponse, ToolMetadata};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAIClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_http_client(Client::new(), api_key)
    }

    pub fn with_http_client(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request_body(&self, transcript: &[Turn], options: &CompletionOptions) -> Value {
        let mut body = json!({
            "model": options.model,
            "messages": self.format_turns(transcript),
        });

        if let Some(temp) = self.temperature {
            body["temperature"] = temp.into();
        }

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        if let Some(effort) = options.reasoning_effort {
            body["reasoning_effort"] = effort.as_str().into();
        }

        if let Some(tools) = options.tools.as_deref() {
            if !tools.is_empty() {
                log::debug!("Sending {} tool definitions", tools.len());
                body["tools"] = Value::Array(tools.iter().map(format_tool).collect());
                body["tool_choice"] = "auto".into();
            }
        }

        body
    }

    fn format_turns(&self, transcript: &[Turn]) -> Vec<Value> {
        transcript
            .iter()
            .map(|turn| {
                let mut message = json!({
                    "role": format_role(turn.role),
                    "content": turn.content,
                });

                if let Role::Tool = turn.role {
                    if let Some(tool_call_id) = &turn.tool_call_id {
                        message["tool_call_id"] = json!(tool_call_id);
                    }
                }

                if let Role::Assistant = turn.role {
                    if turn.has_tool_requests() {
                        let tool_calls: Vec<Value> = turn
                            .tool_requests
                            .iter()
                            .map(|request| {
                                json!({
                                    "id": request.id,
                                    "type": "function",
                                    "function": {
                                        "name": request.tool_name,
                                        "arguments": request.raw_arguments,
                                    }
                                })
                            })
                            .collect();
                        message["tool_calls"] = json!(tool_calls);
                    }
                }

                message
            })
            .collect()
    }

    fn parse_response(&self, response: Value) -> Result<CompletionResponse, CompletionError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .ok_or_else(|| CompletionError::Malformed("No choices in response".to_string()))?;
        let message = &choice["message"];

        let content = message["content"].as_str().map(|s| s.to_string());

        let mut tool_requests = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let function = &call["function"];
                let name = function["name"].as_str().ok_or_else(|| {
                    CompletionError::Malformed("Tool call without a function name".to_string())
                })?;
                // Arguments stay raw; the loop parses them and reports failures to the model.
                let raw_arguments = match &function["arguments"] {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                tool_requests.push(ToolRequest {
                    id: call["id"].as_str().unwrap_or_default().to_string(),
                    tool_name: name.to_string(),
                    raw_arguments,
                });
            }
        }

        let count = |value: &Value| -> Option<u32> {
            value.as_u64().map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        };
        let usage = response.get("usage").and_then(|u| {
            Some(Usage {
                prompt_tokens: count(&u["prompt_tokens"])?,
                completion_tokens: count(&u["completion_tokens"])?,
                total_tokens: count(&u["total_tokens"])?,
            })
        });

        Ok(CompletionResponse {
            content,
            tool_requests,
            finish_reason: choice["finish_reason"].as_str().map(|s| s.to_string()),
            usage,
        })
    }
}

fn format_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn format_tool(tool: &ToolMetadata) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    async fn complete(
        &self,
        transcript: Vec<Turn>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, AgentError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request_body(&transcript, &options);

        log::debug!(
            "Chat completion request to {} with {} turns (tools: {})",
            url,
            transcript.len(),
            options.allows_tools()
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CompletionError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(format!("Failed to read response: {}", e)))?;

        log::debug!("Chat completion response ({}): {}", status, response_text);

        if !status.is_success() {
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body: response_text,
            }
            .into());
        }

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| CompletionError::Malformed(format!("Invalid JSON response: {}", e)))?;

        Ok(self.parse_response(response_json)?)
    }
}

/// Builds a client for the configured provider endpoint.
pub fn create_client(config: &LlmConfig, api_base: &str) -> Result<OpenAIClient, AgentError> {
    let http = Client::builder()
        .timeout(Duration::from_secs(config.parameters.request_timeout_secs))
        .build()
        .map_err(|e| AgentError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

    let mut client =
        OpenAIClient::with_http_client(http, config.auth.api_key.clone()).with_api_base(api_base);
    if let Some(temperature) = config.parameters.temperature {
        client = client.with_temperature(temperature);
    }
    if let Some(max_tokens) = config.parameters.max_tokens {
        client = client.with_max_tokens(max_tokens);
    }
    Ok(client)
}
