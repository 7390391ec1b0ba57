//! Token estimation for transcripts.

use crate::core_types::Turn;
use std::sync::{Arc, OnceLock};
use tiktoken_rs::CoreBPE;

/// Fixed cost of a turn's envelope (role marker and separators).
pub const PER_TURN_OVERHEAD: usize = 4;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn count_turn(&self, turn: &Turn) -> usize {
        let mut total = PER_TURN_OVERHEAD;
        if let Some(content) = &turn.content {
            total += self.count(content);
        }
        for request in &turn.tool_requests {
            total += self.count(&request.tool_name) + self.count(&request.raw_arguments);
        }
        if let Some(name) = &turn.name {
            total += self.count(name);
        }
        total
    }

    fn count_transcript(&self, turns: &[Turn]) -> usize {
        turns.iter().map(|turn| self.count_turn(turn)).sum()
    }
}

/// BPE counting with the `cl100k_base` vocabulary.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    pub fn cl100k() -> anyhow::Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Roughly four characters per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

static DEFAULT_COUNTER: OnceLock<Arc<dyn TokenCounter>> = OnceLock::new();

/// Shared tiktoken counter, or the heuristic if the vocabulary cannot be loaded.
pub fn default_counter() -> Arc<dyn TokenCounter> {
    DEFAULT_COUNTER
        .get_or_init(|| match TiktokenCounter::cl100k() {
            Ok(counter) => Arc::new(counter),
            Err(e) => {
                log::warn!(
                    "Failed to load cl100k_base vocabulary, estimating tokens by length: {}",
                    e
                );
                Arc::new(HeuristicCounter)
            }
        })
        .clone()
}
