//! Token budget enforcement over a transcript.
//!
//! The transcript is reduced in whole units so tool results always stay
//! behind the assistant turn that requested them. A unit is a lone system
//! or user turn, or an assistant turn together with its tool results.
//! System turns, the first user turn and the final unit are never removed.

use super::tokens::TokenCounter;
use super::TOOL_ERROR_PREFIX;
use crate::core_types::{Role, Turn};
use crate::errors::AgentError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub const SYNOPSIS_PREFIX: &str = "[Earlier conversation summarized]";

const COMPRESSED_MARKER: &str = "\n[compressed: ";
/// Characters kept from a compressed tool result.
const EXCERPT_CHARS: usize = 200;
/// Tool results shorter than this are left alone by compression.
const COMPRESS_MIN_CHARS: usize = 400;
const SYNOPSIS_LINE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowStrategy {
    #[default]
    DropOldest,
    DropLowestPriority,
    Summarize,
    Compress,
}

/// What happens when the overflow strategy cannot get under budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExceededPolicy {
    Compress,
    Error,
    #[default]
    Warn,
    TruncateSilently,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub max_tokens: usize,
    #[serde(default)]
    pub reserve_for_response: usize,
    #[serde(default)]
    pub overflow_strategy: OverflowStrategy,
    #[serde(default)]
    pub on_exceeded: ExceededPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetReport {
    pub estimated_before: usize,
    pub estimated_after: usize,
    pub limit: usize,
    pub turns_removed: usize,
}

impl BudgetReport {
    pub fn within_budget(&self) -> bool {
        self.estimated_after <= self.limit
    }

    pub fn changed(&self) -> bool {
        self.estimated_before != self.estimated_after || self.turns_removed > 0
    }
}

impl TokenBudget {
    pub fn new(max_tokens: usize, reserve_for_response: usize) -> Self {
        Self {
            max_tokens,
            reserve_for_response,
            overflow_strategy: OverflowStrategy::default(),
            on_exceeded: ExceededPolicy::default(),
        }
    }

    pub fn with_overflow_strategy(mut self, strategy: OverflowStrategy) -> Self {
        self.overflow_strategy = strategy;
        self
    }

    pub fn with_on_exceeded(mut self, policy: ExceededPolicy) -> Self {
        self.on_exceeded = policy;
        self
    }

    /// Tokens available to the transcript itself.
    pub fn limit(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserve_for_response)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_tokens == 0 {
            return Err(AgentError::ConfigError(
                "token_budget.max_tokens must be greater than 0".to_string(),
            ));
        }
        if self.reserve_for_response >= self.max_tokens {
            return Err(AgentError::ConfigError(format!(
                "token_budget.reserve_for_response ({}) must be smaller than max_tokens ({})",
                self.reserve_for_response, self.max_tokens
            )));
        }
        Ok(())
    }

    /// Reduce `turns` until they fit, then apply the exceeded policy if they
    /// still do not. Running it again on its own output changes nothing.
    pub fn apply(
        &self,
        turns: &mut Vec<Turn>,
        counter: &dyn TokenCounter,
    ) -> Result<BudgetReport, AgentError> {
        let limit = self.limit();
        let initial_len = turns.len();
        let estimated_before = counter.count_transcript(turns);

        if estimated_before <= limit {
            return Ok(BudgetReport {
                estimated_before,
                estimated_after: estimated_before,
                limit,
                turns_removed: 0,
            });
        }

        debug!(
            "Transcript estimated at {} tokens exceeds limit {}, applying {:?}",
            estimated_before, limit, self.overflow_strategy
        );

        let mut estimated = estimated_before;
        while estimated > limit {
            let reduced = match self.overflow_strategy {
                OverflowStrategy::DropOldest => drop_oldest(turns),
                OverflowStrategy::DropLowestPriority => drop_lowest_priority(turns),
                OverflowStrategy::Summarize => summarize_oldest(turns),
                OverflowStrategy::Compress => compress_next(turns),
            };
            if !reduced {
                break;
            }
            estimated = counter.count_transcript(turns);
        }

        if estimated > limit {
            match self.on_exceeded {
                ExceededPolicy::Compress => {
                    // Only protected units are left, so the latest results are fair game too.
                    while compress_first(turns) {}
                    estimated = counter.count_transcript(turns);
                    if estimated > limit {
                        warn!(
                            "Transcript still over budget after compression: {} tokens (limit {})",
                            estimated, limit
                        );
                    }
                }
                ExceededPolicy::Error => {
                    return Err(AgentError::BudgetExceeded { estimated, limit });
                }
                ExceededPolicy::Warn => {
                    warn!(
                        "Transcript over budget: {} tokens (limit {}), proceeding",
                        estimated, limit
                    );
                }
                ExceededPolicy::TruncateSilently => {
                    hard_truncate(turns);
                    estimated = counter.count_transcript(turns);
                    debug!("Hard-truncated transcript to {} tokens", estimated);
                }
            }
        }

        let turns_removed = initial_len.saturating_sub(turns.len());
        if estimated != estimated_before || turns_removed > 0 {
            info!(
                "Token budget applied: {} -> {} tokens (limit {}), {} turn(s) removed",
                estimated_before, estimated, limit, turns_removed
            );
        }

        Ok(BudgetReport {
            estimated_before,
            estimated_after: estimated,
            limit,
            turns_removed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitKind {
    System,
    User,
    Assistant,
    ToolExchange { all_failed: bool },
}

impl UnitKind {
    fn priority(self) -> u8 {
        match self {
            UnitKind::ToolExchange { all_failed: true } => 0,
            UnitKind::ToolExchange { all_failed: false } => 1,
            UnitKind::Assistant => 2,
            UnitKind::User => 3,
            UnitKind::System => u8::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    end: usize,
    kind: UnitKind,
}

fn partition(turns: &[Turn]) -> Vec<Unit> {
    let mut bounds: Vec<(usize, usize)> = Vec::new();
    for (i, turn) in turns.iter().enumerate() {
        if turn.role == Role::Tool {
            if let Some(last) = bounds.last_mut() {
                last.1 = i + 1;
                continue;
            }
        }
        bounds.push((i, i + 1));
    }
    bounds
        .into_iter()
        .map(|(start, end)| Unit {
            start,
            end,
            kind: classify(&turns[start..end]),
        })
        .collect()
}

fn classify(unit: &[Turn]) -> UnitKind {
    match unit[0].role {
        Role::System => UnitKind::System,
        Role::User => UnitKind::User,
        Role::Assistant | Role::Tool => {
            let results: Vec<&Turn> = unit.iter().filter(|t| t.role == Role::Tool).collect();
            if unit[0].has_tool_requests() || !results.is_empty() {
                UnitKind::ToolExchange {
                    all_failed: !results.is_empty()
                        && results.iter().all(|t| t.text().starts_with(TOOL_ERROR_PREFIX)),
                }
            } else {
                UnitKind::Assistant
            }
        }
    }
}

fn removable(units: &[Unit]) -> Vec<usize> {
    let first_user = units.iter().position(|u| u.kind == UnitKind::User);
    let last = units.len().saturating_sub(1);
    (0..units.len())
        .filter(|&i| units[i].kind != UnitKind::System && Some(i) != first_user && i != last)
        .collect()
}

fn drop_oldest(turns: &mut Vec<Turn>) -> bool {
    let units = partition(turns);
    match removable(&units).first() {
        Some(&i) => {
            turns.drain(units[i].start..units[i].end);
            true
        }
        None => false,
    }
}

fn drop_lowest_priority(turns: &mut Vec<Turn>) -> bool {
    let units = partition(turns);
    let victim = removable(&units)
        .into_iter()
        .min_by_key(|&i| (units[i].kind.priority(), i));
    match victim {
        Some(i) => {
            turns.drain(units[i].start..units[i].end);
            true
        }
        None => false,
    }
}

fn summarize_oldest(turns: &mut Vec<Turn>) -> bool {
    let units = partition(turns);
    let unit = match removable(&units).first() {
        Some(&i) => units[i],
        None => return false,
    };

    let line = describe_unit(&turns[unit.start..unit.end]);
    turns.drain(unit.start..unit.end);

    match turns.iter_mut().find(|t| is_synopsis(t)) {
        Some(synopsis) => {
            let content = synopsis.content.get_or_insert_with(String::new);
            content.push_str("\n- ");
            content.push_str(&line);
        }
        None => {
            let at = turns.iter().take_while(|t| t.role == Role::System).count();
            turns.insert(at, Turn::system(format!("{}\n- {}", SYNOPSIS_PREFIX, line)));
        }
    }
    true
}

/// Compress the oldest superseded tool result that is still worth shrinking.
fn compress_next(turns: &mut [Turn]) -> bool {
    match turns.iter().rposition(|t| t.role == Role::Assistant) {
        Some(latest_assistant) => compress_first(&mut turns[..latest_assistant]),
        None => false,
    }
}

/// Compress the first tool result in `turns` that is long enough and not
/// already compressed.
fn compress_first(turns: &mut [Turn]) -> bool {
    let candidate = turns.iter_mut().find(|t| {
        t.role == Role::Tool
            && !t.text().contains(COMPRESSED_MARKER)
            && t.text().chars().count() > COMPRESS_MIN_CHARS
    });

    match candidate {
        Some(turn) => {
            let body = turn.text();
            let total = body.chars().count();
            let head: String = body.chars().take(EXCERPT_CHARS).collect();
            let compressed = format!(
                "{}{}{} chars omitted]",
                head,
                COMPRESSED_MARKER,
                total - EXCERPT_CHARS
            );
            turn.content = Some(compressed);
            true
        }
        None => false,
    }
}

fn hard_truncate(turns: &mut Vec<Turn>) {
    while drop_oldest(turns) {}
    turns.retain(|t| !is_synopsis(t));
    while compress_first(turns) {}
}

fn is_synopsis(turn: &Turn) -> bool {
    turn.role == Role::System && turn.text().starts_with(SYNOPSIS_PREFIX)
}

fn describe_unit(unit: &[Turn]) -> String {
    let head = &unit[0];
    match head.role {
        Role::User => format!("user: {}", excerpt(head.text())),
        _ if head.has_tool_requests() => {
            let names: Vec<&str> = head
                .tool_requests
                .iter()
                .map(|r| r.tool_name.as_str())
                .collect();
            let failed = unit
                .iter()
                .filter(|t| t.role == Role::Tool && t.text().starts_with(TOOL_ERROR_PREFIX))
                .count();
            format!(
                "assistant called {} ({} of {} failed)",
                names.join(", "),
                failed,
                names.len()
            )
        }
        _ => format!("assistant: {}", excerpt(head.text())),
    }
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SYNOPSIS_LINE_CHARS {
        flat
    } else {
        let mut cut: String = flat.chars().take(SYNOPSIS_LINE_CHARS).collect();
        cut.push_str("...");
        cut
    }
}
