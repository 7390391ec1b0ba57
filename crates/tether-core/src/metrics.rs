//! Per-call tool execution records.
//!
//! The ledger is append-only: records are pushed by the loop as each tool
//! call finishes and are never edited afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub tool_name: String,
    pub tool_call_id: String,
    /// 1-based loop iteration that produced the request.
    pub iteration: usize,
    pub succeeded: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolExecutionRecord {
    pub fn success(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        iteration: usize,
        duration: Duration,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_call_id: tool_call_id.into(),
            iteration,
            succeeded: true,
            duration_ms: duration.as_millis() as u64,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        iteration: usize,
        duration: Duration,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            succeeded: false,
            error_message: Some(error_message.into()),
            ..Self::success(tool_name, tool_call_id, iteration, duration)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsLedger {
    records: Vec<ToolExecutionRecord>,
}

impl MetricsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ToolExecutionRecord) {
        log::debug!(
            "Recorded tool execution: {} (iteration {}, succeeded: {}, {}ms)",
            record.tool_name,
            record.iteration,
            record.succeeded,
            record.duration_ms
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[ToolExecutionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ToolExecutionRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<ToolExecutionRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a MetricsLedger {
    type Item = &'a ToolExecutionRecord;
    type IntoIter = std::slice::Iter<'a, ToolExecutionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
