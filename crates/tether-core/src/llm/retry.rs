//! Retry with exponential backoff around any completion client.
//!
//! Transport failures, 408/429 and 5xx responses are retried; client errors
//! and malformed bodies fail on the first attempt. Callers above this layer
//! never re-issue a failed completion.

use crate::errors::AgentError;
use crate::llm::{CompletionClient, CompletionOptions, CompletionResponse, Turn};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent);
        Duration::from_millis(millis.min(self.max_delay_ms as f64) as u64)
    }
}

pub struct RetryingClient {
    inner: Arc<dyn CompletionClient>,
    config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn CompletionClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl CompletionClient for RetryingClient {
    async fn complete(
        &self,
        transcript: Vec<Turn>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, AgentError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.complete(transcript.clone(), options.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!("Completion succeeded on attempt {}", attempt);
                    }
                    return Ok(response);
                }
                Err(AgentError::Completion(err))
                    if err.is_retryable() && attempt < max_attempts =>
                {
                    let delay = self.config.delay_for(attempt);
                    warn!(
                        "Completion attempt {}/{} failed: {}. Retrying in {}ms",
                        attempt,
                        max_attempts,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        warn!("Completion failed after {} attempts: {}", attempt, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}
