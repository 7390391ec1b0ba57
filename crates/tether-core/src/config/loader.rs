//! Configuration loader for YAML files and environment resolution

use crate::config::types::*;
use crate::errors::AgentError;
use std::env;
use std::path::Path;
use tokio::fs;

/// Consulted when neither `api_key` nor `api_key_env` is configured.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<TetherConfig, AgentError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        log::debug!("Loaded configuration from {}", path.display());
        Self::from_str(&content).await
    }

    /// Load configuration from a YAML string
    pub async fn from_str(content: &str) -> Result<TetherConfig, AgentError> {
        let mut config: TetherConfig = serde_yaml::from_str(content)
            .map_err(|e| AgentError::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

        Self::resolve_llm_auth(&mut config.llm.auth);

        config.validate()?;

        Ok(config)
    }

    fn resolve_llm_auth(auth: &mut LlmAuth) {
        if let Some(env_var) = &auth.api_key_env {
            match env::var(env_var) {
                Ok(api_key) => auth.api_key = Some(api_key),
                Err(_) => log::warn!("Environment variable {} is not set", env_var),
            }
        }

        if auth.api_key.is_none() && auth.api_key_env.is_none() {
            if let Ok(api_key) = env::var(DEFAULT_API_KEY_ENV) {
                auth.api_key = Some(api_key);
            }
        }
    }
}
