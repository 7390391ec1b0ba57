//! Transcript state for one loop invocation.
//!
//! [`Conversation`] guards the tool-turn invariant: every tool turn answers a
//! request from the assistant turn immediately before it, and each request is
//! answered at most once. Budget enforcement lives in [`budget`] and counts
//! tokens through a [`tokens::TokenCounter`].

pub mod budget;
pub mod tokens;

use crate::core_types::{Role, ToolRequest, Turn};
use crate::errors::{AgentError, ConversationError};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub use budget::{BudgetReport, ExceededPolicy, OverflowStrategy, TokenBudget, SYNOPSIS_PREFIX};
pub use tokens::{default_counter, HeuristicCounter, TiktokenCounter, TokenCounter};

/// Prefix of every tool-result body that reports a failure.
pub const TOOL_ERROR_PREFIX: &str = "Error: ";

#[derive(Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
    /// Requests of the latest assistant turn that have no result yet.
    pending: Vec<String>,
    /// Requests of the latest assistant turn, answered or not.
    window: Vec<String>,
    used_ids: HashSet<String>,
    counter: Arc<dyn TokenCounter>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConversationStats {
    pub turn_count: usize,
    pub user_turns: usize,
    pub assistant_turns: usize,
    pub tool_requests: usize,
    pub tool_results: usize,
    pub failed_results: usize,
    pub pending_requests: usize,
    pub estimated_tokens: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_counter(default_counter())
    }

    pub fn with_counter(counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            turns: Vec::new(),
            pending: Vec::new(),
            window: Vec::new(),
            used_ids: HashSet::new(),
            counter,
        }
    }

    /// Seed a conversation, checking each turn as if it had been appended.
    pub fn from_turns(
        turns: impl IntoIterator<Item = Turn>,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, AgentError> {
        let mut conversation = Self::with_counter(counter);
        for turn in turns {
            conversation.push(turn)?;
        }
        Ok(conversation)
    }

    pub fn push(&mut self, turn: Turn) -> Result<(), AgentError> {
        match turn.role {
            Role::System => {
                self.append_system(turn.content.unwrap_or_default());
                Ok(())
            }
            Role::User => {
                self.append_user(turn.content.unwrap_or_default());
                Ok(())
            }
            Role::Assistant => self.append_assistant(turn.content, turn.tool_requests),
            Role::Tool => {
                let id = turn.tool_call_id.unwrap_or_default();
                let name = turn.name.unwrap_or_default();
                self.append_tool_result(id, turn.content.unwrap_or_default(), name)
            }
        }
    }

    pub fn append_system(&mut self, text: impl Into<String>) {
        self.close_window();
        self.turns.push(Turn::system(text));
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.close_window();
        self.turns.push(Turn::user(text));
    }

    pub fn append_assistant(
        &mut self,
        text: Option<String>,
        tool_requests: Vec<ToolRequest>,
    ) -> Result<(), AgentError> {
        if !self.pending.is_empty() {
            return Err(ConversationError::UnansweredToolRequests(self.pending.len()).into());
        }

        let mut batch = HashSet::new();
        for request in &tool_requests {
            if self.used_ids.contains(&request.id) || !batch.insert(request.id.as_str()) {
                return Err(ConversationError::DuplicateToolCallId(request.id.clone()).into());
            }
        }

        self.window = tool_requests.iter().map(|r| r.id.clone()).collect();
        self.pending = self.window.clone();
        self.used_ids.extend(self.window.iter().cloned());
        self.turns.push(Turn::assistant(text, tool_requests));
        Ok(())
    }

    pub fn append_tool_result(
        &mut self,
        tool_call_id: impl Into<String>,
        text: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Result<(), AgentError> {
        let tool_call_id = tool_call_id.into();
        match self.pending.iter().position(|id| *id == tool_call_id) {
            Some(pos) => {
                self.pending.remove(pos);
                self.turns
                    .push(Turn::tool_result(tool_call_id, text, tool_name));
                Ok(())
            }
            None if self.window.contains(&tool_call_id) => {
                Err(ConversationError::AlreadyAnswered(tool_call_id).into())
            }
            None => Err(ConversationError::UnknownToolCall(tool_call_id).into()),
        }
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn pending_tool_requests(&self) -> &[String] {
        &self.pending
    }

    /// Whether `id` already names a tool request in this transcript.
    pub fn is_id_used(&self, id: &str) -> bool {
        self.used_ids.contains(id)
    }

    pub fn estimate_tokens(&self) -> usize {
        self.counter.count_transcript(&self.turns)
    }

    pub fn apply_token_budget(
        &mut self,
        budget: &TokenBudget,
    ) -> Result<BudgetReport, AgentError> {
        budget.apply(&mut self.turns, self.counter.as_ref())
    }

    pub(crate) fn counter(&self) -> Arc<dyn TokenCounter> {
        self.counter.clone()
    }

    pub fn stats(&self) -> ConversationStats {
        let mut stats = ConversationStats {
            turn_count: self.turns.len(),
            pending_requests: self.pending.len(),
            estimated_tokens: self.estimate_tokens(),
            ..Default::default()
        };
        for turn in &self.turns {
            match turn.role {
                Role::User => stats.user_turns += 1,
                Role::Assistant => {
                    stats.assistant_turns += 1;
                    stats.tool_requests += turn.tool_requests.len();
                }
                Role::Tool => {
                    stats.tool_results += 1;
                    if turn.text().starts_with(TOOL_ERROR_PREFIX) {
                        stats.failed_results += 1;
                    }
                }
                Role::System => {}
            }
        }
        stats
    }

    fn close_window(&mut self) {
        if !self.pending.is_empty() {
            log::warn!(
                "Closing tool window with {} unanswered request(s): {:?}",
                self.pending.len(),
                self.pending
            );
        }
        self.pending.clear();
        self.window.clear();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("turns", &self.turns)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation::with_counter(Arc::new(HeuristicCounter))
    }

    fn request(id: &str, tool: &str) -> ToolRequest {
        ToolRequest::new(id, tool, "{}")
    }

    #[test]
    fn test_tool_results_answer_pending_requests() {
        let mut conv = conversation();
        conv.append_system("sys");
        conv.append_user("task");
        conv.append_assistant(None, vec![request("c1", "a"), request("c2", "b")])
            .unwrap();
        assert_eq!(conv.pending_tool_requests(), &["c1".to_string(), "c2".to_string()]);

        conv.append_tool_result("c2", "two", "b").unwrap();
        conv.append_tool_result("c1", "one", "a").unwrap();
        assert!(conv.pending_tool_requests().is_empty());
        assert_eq!(conv.len(), 5);
        assert_eq!(conv.snapshot()[3].tool_call_id.as_deref(), Some("c2"));
    }

    #[test]
    fn test_unknown_and_repeated_results_are_rejected() {
        let mut conv = conversation();
        conv.append_user("task");
        conv.append_assistant(None, vec![request("c1", "a")]).unwrap();

        let err = conv.append_tool_result("nope", "x", "a").unwrap_err();
        assert!(matches!(
            err,
            AgentError::ConversationViolation(ConversationError::UnknownToolCall(_))
        ));

        conv.append_tool_result("c1", "ok", "a").unwrap();
        let err = conv.append_tool_result("c1", "again", "a").unwrap_err();
        assert!(matches!(
            err,
            AgentError::ConversationViolation(ConversationError::AlreadyAnswered(_))
        ));
        assert_eq!(conv.len(), 3);
    }

    #[test]
    fn test_assistant_turn_waits_for_pending_results() {
        let mut conv = conversation();
        conv.append_user("task");
        conv.append_assistant(None, vec![request("c1", "a")]).unwrap();
        let err = conv
            .append_assistant(Some("done".into()), vec![])
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::ConversationViolation(ConversationError::UnansweredToolRequests(1))
        ));
    }

    #[test]
    fn test_request_ids_are_unique_across_transcript() {
        let mut conv = conversation();
        conv.append_user("task");
        conv.append_assistant(None, vec![request("c1", "a")]).unwrap();
        conv.append_tool_result("c1", "ok", "a").unwrap();

        assert!(conv.is_id_used("c1"));
        assert!(conv.append_assistant(None, vec![request("c1", "a")]).is_err());
        assert!(conv
            .append_assistant(None, vec![request("c2", "a"), request("c2", "b")])
            .is_err());
        assert_eq!(conv.len(), 3);
    }

    #[test]
    fn test_user_turn_closes_tool_window() {
        let mut conv = conversation();
        conv.append_user("task");
        conv.append_assistant(None, vec![request("c1", "a")]).unwrap();
        conv.append_user("never mind");

        assert!(conv.pending_tool_requests().is_empty());
        assert!(conv.append_tool_result("c1", "late", "a").is_err());
        assert!(conv.append_assistant(Some("ok".into()), vec![]).is_ok());
    }

    #[test]
    fn test_from_turns_validates_seed() {
        let seeded = Conversation::from_turns(
            vec![
                Turn::system("sys"),
                Turn::user("task"),
                Turn::assistant(None, vec![request("c1", "a")]),
                Turn::tool_result("c1", "ok", "a"),
            ],
            Arc::new(HeuristicCounter),
        )
        .unwrap();
        assert_eq!(seeded.len(), 4);

        let broken = Conversation::from_turns(
            vec![Turn::user("task"), Turn::tool_result("c9", "ok", "a")],
            Arc::new(HeuristicCounter),
        );
        assert!(broken.is_err());
    }

    #[test]
    fn test_stats_count_failures() {
        let mut conv = conversation();
        conv.append_user("task");
        conv.append_assistant(None, vec![request("c1", "a"), request("c2", "b")])
            .unwrap();
        conv.append_tool_result("c1", "ok", "a").unwrap();
        conv.append_tool_result("c2", "Error: Tool not found: b", "b")
            .unwrap();

        let stats = conv.stats();
        assert_eq!(stats.turn_count, 4);
        assert_eq!(stats.tool_requests, 2);
        assert_eq!(stats.tool_results, 2);
        assert_eq!(stats.failed_results, 1);
        assert_eq!(stats.pending_requests, 0);
        assert_eq!(stats.estimated_tokens, conv.estimate_tokens());
    }

    #[test]
    fn test_budget_application_is_idempotent() {
        let mut conv = conversation();
        conv.append_system("sys");
        conv.append_user("task");
        for i in 0..6 {
            let id = format!("c{}", i);
            conv.append_assistant(None, vec![request(&id, "git_log")])
                .unwrap();
            conv.append_tool_result(&id, "x".repeat(500), "git_log")
                .unwrap();
        }

        let budget = TokenBudget::new(400, 100);
        conv.apply_token_budget(&budget).unwrap();
        let once = conv.snapshot();
        let report = conv.apply_token_budget(&budget).unwrap();
        assert_eq!(conv.snapshot(), once);
        assert!(!report.changed());
    }
}
