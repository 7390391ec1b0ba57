//! Tool registry: the closed, named capability surface the model can call
//!
//! A tool is a `ToolDefinition` record: name, description, JSON parameter
//! schema and the capability that does the work. Names are unique and checked
//! when a tool is registered, never at call time. Parameter schemas are
//! compiled up front so argument validation at dispatch is cheap.

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::errors::AgentError;
use crate::llm::ToolMetadata;

pub mod context;

pub use context::{ToolContext, ToolLogger};

/// The work behind a tool. Implementations are supplied by domain callers.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, arguments: Value, context: &ToolContext) -> anyhow::Result<Value>;
}

/// Capability backed by an async closure.
pub struct FnCapability<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> Capability for FnCapability<F>
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn invoke(&self, arguments: Value, context: &ToolContext) -> anyhow::Result<Value> {
        (self.func)(arguments, context.clone()).await
    }
}

#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
    capability: Arc<dyn Capability>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: Value,
        capability: Arc<dyn Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            capability,
        }
    }

    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: Value,
        func: F,
    ) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(
            name,
            description,
            parameter_schema,
            Arc::new(FnCapability { func }),
        )
    }

    pub fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.parameter_schema.clone(),
        }
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameter_schema", &self.parameter_schema)
            .finish_non_exhaustive()
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    validator: JSONSchema,
}

/// Registry of tools available to a loop. Read-only once built, so one
/// `Arc<ToolRegistry>` can serve many concurrent loop invocations.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), AgentError> {
        if self.index.contains_key(&definition.name) {
            return Err(AgentError::DuplicateTool(definition.name));
        }
        let validator = compile_schema(&definition)?;
        self.insert(definition, validator);
        Ok(())
    }

    /// Registers a batch in order. Either every definition is inserted or,
    /// when any name collides or any schema fails to compile, none is.
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = ToolDefinition>,
    ) -> Result<(), AgentError> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::new();
        for definition in definitions {
            if self.index.contains_key(&definition.name) || !seen.insert(definition.name.clone()) {
                return Err(AgentError::DuplicateTool(definition.name));
            }
            let validator = compile_schema(&definition)?;
            compiled.push((definition, validator));
        }
        for (definition, validator) in compiled {
            self.insert(definition, validator);
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i].definition)
    }

    /// Capability catalog sent to the model, in registration order.
    pub fn describe_all(&self) -> Vec<ToolMetadata> {
        self.tools.iter().map(|t| t.definition.metadata()).collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        arguments: Value,
        context: &ToolContext,
    ) -> Result<Value, AgentError> {
        let tool = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        if let Err(errors) = tool.validator.validate(&arguments) {
            let message = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            return Err(AgentError::InvalidArguments {
                tool_name: name.to_string(),
                message,
            });
        }

        let scoped = context.scoped_to(name);
        tool.definition
            .capability
            .invoke(arguments, &scoped)
            .await
            .map_err(|e| AgentError::ToolExecution {
                tool_name: name.to_string(),
                message: format!("{:#}", e),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.definition.name.as_str()).collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn insert(&mut self, definition: ToolDefinition, validator: JSONSchema) {
        log::debug!("Registered tool: {}", definition.name);
        self.index.insert(definition.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            validator,
        });
    }
}

fn compile_schema(definition: &ToolDefinition) -> Result<JSONSchema, AgentError> {
    JSONSchema::compile(&definition.parameter_schema).map_err(|e| AgentError::InvalidToolSchema {
        tool_name: definition.name.clone(),
        message: e.to_string(),
    })
}

/// Renders a capability's result as tool-turn text. Strings pass through
/// untouched; everything else is serialized as JSON.
pub fn render_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(no output)".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &str) -> ToolDefinition {
        ToolDefinition::from_fn(
            name,
            "Echoes its input",
            json!({"type": "object"}),
            |args, _ctx| async move { Ok(args) },
        )
    }

    fn failing_tool(name: &str) -> ToolDefinition {
        ToolDefinition::from_fn(
            name,
            "Always fails",
            json!({"type": "object"}),
            |_args, _ctx| async move { Err(anyhow::anyhow!("disk on fire")) },
        )
    }

    #[test]
    fn test_tool_registry_creation() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.tool_count(), 0);
        assert!(registry.is_empty());
        assert!(registry.describe_all().is_empty());
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("read_file")).unwrap();

        assert_eq!(registry.tool_count(), 1);
        assert!(registry.lookup("read_file").is_some());
        assert!(registry.lookup("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_registration_leaves_catalog_unchanged() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("git_log")).unwrap();
        let before: Vec<String> = registry.describe_all().into_iter().map(|m| m.name).collect();

        let err = registry.register(failing_tool("git_log")).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(ref n) if n == "git_log"));

        let after: Vec<String> = registry.describe_all().into_iter().map(|m| m.name).collect();
        assert_eq!(before, after);
        assert_eq!(registry.lookup("git_log").unwrap().description, "Echoes its input");
    }

    #[test]
    fn test_register_all_rejects_duplicate_within_batch() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("existing")).unwrap();

        let err = registry
            .register_all(vec![echo_tool("a"), echo_tool("b"), echo_tool("a")])
            .unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(ref n) if n == "a"));
        assert_eq!(registry.names(), vec!["existing"]);

        let err = registry
            .register_all(vec![echo_tool("c"), echo_tool("existing")])
            .unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(ref n) if n == "existing"));
        assert_eq!(registry.names(), vec!["existing"]);
    }

    #[test]
    fn test_register_all_preserves_order() {
        let mut registry = ToolRegistry::new();
        registry
            .register_all(vec![echo_tool("zeta"), echo_tool("alpha"), echo_tool("mid")])
            .unwrap();
        let names: Vec<String> = registry.describe_all().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_invalid_schema_is_rejected_at_registration() {
        let mut registry = ToolRegistry::new();
        let bad = ToolDefinition::from_fn(
            "bad",
            "Broken schema",
            json!({"type": 12}),
            |args, _ctx| async move { Ok(args) },
        );
        let err = registry.register(bad).unwrap_err();
        assert!(matches!(err, AgentError::InvalidToolSchema { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(ref n) if n == "missing"));
    }

    #[tokio::test]
    async fn test_execute_wraps_capability_error() {
        let mut registry = ToolRegistry::new();
        registry.register(failing_tool("explode")).unwrap();
        let err = registry
            .execute("explode", json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        match err {
            AgentError::ToolExecution { tool_name, message } => {
                assert_eq!(tool_name, "explode");
                assert!(message.contains("disk on fire"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_validates_arguments_against_schema() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::from_fn(
                "read_file",
                "Reads a file",
                json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"]
                }),
                |args, _ctx| async move { Ok(args["path"].clone()) },
            ))
            .unwrap();

        let err = registry
            .execute("read_file", json!({"path": 3}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));

        let ok = registry
            .execute("read_file", json!({"path": "Cargo.toml"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(ok, json!("Cargo.toml"));
    }

    #[tokio::test]
    async fn test_execute_scopes_context_to_tool() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDefinition::from_fn(
                "whoami",
                "Reports its own name and directory",
                json!({"type": "object"}),
                |_args, ctx| async move {
                    Ok(json!({
                        "tool": ctx.tool_name(),
                        "cwd": ctx.working_directory().display().to_string(),
                    }))
                },
            ))
            .unwrap();

        let out = registry
            .execute("whoami", json!({}), &ToolContext::new("/work"))
            .await
            .unwrap();
        assert_eq!(out, json!({"tool": "whoami", "cwd": "/work"}));
    }

    #[test]
    fn test_render_output() {
        assert_eq!(render_output(&json!("plain text")), "plain text");
        assert_eq!(render_output(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(render_output(&Value::Null), "(no output)");
    }
}
