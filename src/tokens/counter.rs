//! Token counter implementations.

use crate::types::Message;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Content-only estimate summed over messages.
    fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count(&m.content)).sum()
    }
}

/// Character-ratio estimator. The default ratio is 4 characters per token,
/// rounded down, which is the heuristic the cache and the batch coalescer use
/// for their bookkeeping.
#[derive(Debug, Clone)]
pub struct CharacterEstimator {
    chars_per_token: usize,
}
impl CharacterEstimator {
    pub fn new() -> Self {
        Self::with_ratio(4)
    }
    pub fn with_ratio(r: usize) -> Self {
        Self {
            chars_per_token: r.max(1),
        }
    }
}
impl Default for CharacterEstimator {
    fn default() -> Self {
        Self::new()
    }
}
impl TokenCounter for CharacterEstimator {
    fn count(&self, text: &str) -> usize {
        text.len() / self.chars_per_token
    }
}

/// Shorthand for the default heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    CharacterEstimator::new().count(text)
}

pub fn estimate_message_tokens(messages: &[Message]) -> usize {
    CharacterEstimator::new().count_messages(messages)
}
