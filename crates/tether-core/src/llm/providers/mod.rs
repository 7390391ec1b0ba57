//! Provider integrations.
//!
//! Every supported endpoint speaks the OpenAI chat-completions dialect; a
//! custom provider only changes the base URL.

use crate::config::{LlmConfig, LlmProvider};
use crate::errors::AgentError;
use crate::llm::retry::{RetryConfig, RetryingClient};
use crate::llm::CompletionClient;
use std::sync::Arc;

pub mod openai;

pub use openai::OpenAIClient;

/// Build the configured client, wrapped in the retry layer.
pub fn create_client(
    config: &LlmConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn CompletionClient>, AgentError> {
    validate_provider_config(config)?;

    let api_base = match (&config.provider, &config.api_base) {
        (_, Some(api_base)) => api_base.clone(),
        (LlmProvider::OpenAI, None) => openai::DEFAULT_API_BASE.to_string(),
        (LlmProvider::Custom { base_url }, None) => base_url.clone(),
    };

    log::info!(
        "Creating completion client for model '{}' at {}",
        config.model,
        api_base
    );
    let client = openai::create_client(config, &api_base)?;
    Ok(Arc::new(RetryingClient::new(Arc::new(client), retry.clone())))
}

pub fn validate_provider_config(config: &LlmConfig) -> Result<(), AgentError> {
    match &config.provider {
        LlmProvider::OpenAI => {
            if config.auth.api_key.is_none() && config.auth.api_key_env.is_none() {
                return Err(AgentError::ConfigError(
                    "OpenAI provider requires either 'api_key' or 'api_key_env'".to_string(),
                ));
            }
        }
        LlmProvider::Custom { base_url } => {
            if base_url.is_empty() {
                return Err(AgentError::ConfigError(
                    "Custom provider requires a valid 'base_url'".to_string(),
                ));
            }
        }
    }
    Ok(())
}
