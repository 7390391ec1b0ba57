//! `env_logger` setup driven by [`LoggingConfig`].
//!
//! Library code only ever uses the `log` macros; installing a logger is left
//! to the binary embedding the loop.

use crate::config::LoggingConfig;
use crate::errors::AgentError;
use env_logger::{Builder, Target, WriteStyle};
use log::LevelFilter;
use std::fs::OpenOptions;

pub fn parse_level(level: &str) -> Result<LevelFilter, AgentError> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| AgentError::ConfigError(format!("Unknown log level '{}'", level)))
}

/// Builder for the configured logger, not yet installed.
pub fn build_logger(config: &LoggingConfig) -> Result<Builder, AgentError> {
    let mut builder = Builder::new();
    builder.filter_level(parse_level(&config.level)?);

    if let Some(path) = &config.file {
        let log_file = OpenOptions::new().create(true).append(true).open(path)?;
        builder
            .target(Target::Pipe(Box::new(log_file)))
            .write_style(WriteStyle::Never);
    } else if !config.colored {
        builder.write_style(WriteStyle::Never);
    }

    Ok(builder)
}

/// Install the global logger. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), AgentError> {
    build_logger(config)?
        .try_init()
        .map_err(|e| AgentError::ConfigError(format!("Failed to initialize logger: {}", e)))
}
