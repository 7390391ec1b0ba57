//! Per-invocation context handed to every capability.
//!
//! Nothing a tool needs is looked up from process-wide state: the working
//! directory, the caller's storage handle, a logger and an optional time
//! limit all travel explicitly with each call.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const TOOL_LOG_TARGET: &str = "tether::tool";

#[derive(Clone)]
pub struct ToolContext {
    working_directory: PathBuf,
    storage: Option<Arc<dyn Any + Send + Sync>>,
    timeout: Option<Duration>,
    tool_name: Option<String>,
}

impl ToolContext {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            storage: None,
            timeout: None,
            tool_name: None,
        }
    }

    /// Attach an opaque storage handle; capabilities recover it with
    /// [`ToolContext::storage`].
    pub fn with_storage<T: Any + Send + Sync>(mut self, storage: Arc<T>) -> Self {
        let storage: Arc<dyn Any + Send + Sync> = storage;
        self.storage = Some(storage);
        self
    }

    /// Time limit capabilities are expected to honor. The core never enforces it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn storage<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.storage.clone()?.downcast::<T>().ok()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    pub fn logger(&self) -> ToolLogger {
        let target = match &self.tool_name {
            Some(name) => format!("{}::{}", TOOL_LOG_TARGET, name),
            None => TOOL_LOG_TARGET.to_string(),
        };
        ToolLogger { target }
    }

    pub(crate) fn scoped_to(&self, tool_name: &str) -> Self {
        let mut scoped = self.clone();
        scoped.tool_name = Some(tool_name.to_string());
        scoped
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new(".")
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("working_directory", &self.working_directory)
            .field("has_storage", &self.storage.is_some())
            .field("timeout", &self.timeout)
            .field("tool_name", &self.tool_name)
            .finish()
    }
}

/// Logger bound to a single tool invocation's target.
#[derive(Debug, Clone)]
pub struct ToolLogger {
    target: String,
}

impl ToolLogger {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn debug(&self, message: impl fmt::Display) {
        log::debug!(target: &self.target, "{}", message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        log::info!(target: &self.target, "{}", message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        log::warn!(target: &self.target, "{}", message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        log::error!(target: &self.target, "{}", message);
    }
}
