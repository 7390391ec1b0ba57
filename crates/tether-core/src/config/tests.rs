use super::*;
use crate::agent::ToolDispatch;
use crate::conversation::{ExceededPolicy, OverflowStrategy};
use crate::llm::ReasoningEffort;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
agent:
  max_iterations: 4
  tool_dispatch: sequential
  reasoning_effort: low
  working_directory: "/srv/repo"
  tool_timeout: 15

llm:
  provider: openai
  model: gpt-4.1-mini
  api_base: "http://127.0.0.1:9000/v1"
  auth:
    api_key: "sk-test"
  parameters:
    temperature: 0.0
    request_timeout_secs: 30

retry:
  max_attempts: 5
  initial_delay_ms: 250

token_budget:
  max_tokens: 16000
  reserve_for_response: 2000
  overflow_strategy: drop-lowest-priority
  on_exceeded: error

logging:
  level: debug
  colored: false
"#;

#[tokio::test]
async fn test_full_config_round_trip() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(FULL_CONFIG.as_bytes()).unwrap();

    let config = load_config(file.path()).await.unwrap();

    assert_eq!(config.agent.max_iterations, 4);
    assert_eq!(config.agent.tool_dispatch, ToolDispatch::Sequential);
    assert_eq!(config.agent.reasoning_effort, Some(ReasoningEffort::Low));
    assert_eq!(config.llm.api_base.as_deref(), Some("http://127.0.0.1:9000/v1"));
    assert_eq!(config.llm.parameters.request_timeout_secs, 30);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.initial_delay_ms, 250);
    assert_eq!(config.retry.max_delay_ms, 30_000);

    let budget = config.token_budget.clone().unwrap();
    assert_eq!(budget.overflow_strategy, OverflowStrategy::DropLowestPriority);
    assert_eq!(budget.on_exceeded, ExceededPolicy::Error);

    assert_eq!(config.logging.level, "debug");
    assert!(!config.logging.colored);

    let context = config.agent.tool_context();
    assert_eq!(context.working_directory(), PathBuf::from("/srv/repo").as_path());
    assert_eq!(context.timeout(), Some(Duration::from_secs(15)));
}

#[tokio::test]
async fn test_defaults_apply_to_minimal_config() {
    let config = ConfigLoader::from_str(
        "llm:\n  provider: openai\n  model: gpt-4o\n  auth:\n    api_key: sk\n",
    )
    .await
    .unwrap();

    assert_eq!(config.agent.max_iterations, 10);
    assert_eq!(config.agent.tool_dispatch, ToolDispatch::Sequential);
    assert!(config.agent.reasoning_effort.is_none());
    assert_eq!(config.retry, crate::llm::RetryConfig::default());
    assert_eq!(config.logging.level, "info");
    assert!(config.agent.tool_context().timeout().is_none());
}

#[tokio::test]
async fn test_validation_failures() {
    let cases = [
        ("llm:\n  provider: openai\n", "model"),
        (
            "llm:\n  provider: openai\n  model: m\nretry:\n  max_attempts: 0\n",
            "max_attempts",
        ),
        (
            "llm:\n  provider: openai\n  model: m\ntoken_budget:\n  max_tokens: 100\n  reserve_for_response: 100\n",
            "reserve_for_response",
        ),
        (
            "llm:\n  provider: openai\n  model: m\nlogging:\n  level: loud\n",
            "log level",
        ),
    ];

    for (yaml, needle) in cases {
        match ConfigLoader::from_str(yaml).await {
            Err(AgentError::ConfigError(message)) => {
                assert!(message.contains(needle), "{} not in {}", needle, message)
            }
            other => panic!("expected config error for {:?}, got {:?}", needle, other),
        }
    }
}

#[tokio::test]
async fn test_invalid_yaml_is_config_error() {
    let err = ConfigLoader::from_str("llm: [unterminated").await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse YAML config"));
}

#[test]
fn test_agent_model_overrides_llm_model() {
    let mut config: TetherConfig =
        serde_yaml::from_str("llm:\n  provider: openai\n  model: base-model\n").unwrap();
    assert_eq!(config.model(), "base-model");
    config.agent.model = Some("override".to_string());
    assert_eq!(config.model(), "override");
    assert!(validate_config(&config).is_ok());
}
