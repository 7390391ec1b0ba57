//! Configuration for the completion loop
//!
//! YAML files are parsed into [`TetherConfig`], API keys are resolved from the
//! environment, and the result is validated before it is handed out.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

#[cfg(test)]
mod tests;

use crate::errors::AgentError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<TetherConfig, AgentError> {
    ConfigLoader::from_file(path).await
}

/// Validate a configuration
pub fn validate_config(config: &TetherConfig) -> Result<(), AgentError> {
    config.validate()
}
