//! Generation output types.

use std::time::Duration;

use serde::Serialize;

use super::tokenizer::TokenId;

/// Reason why text generation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// A stop sequence appeared in the generated text.
    StopSequence,
    /// Hit `max_new_tokens`.
    TokenBudgetExhausted,
    /// Model emitted end-of-sequence, or had nothing to condition on.
    EndOfSequence,
    Cancelled,
    TimedOut,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopSequence => "stop_sequence",
            Self::TokenBudgetExhausted => "token_budget_exhausted",
            Self::EndOfSequence => "end_of_sequence",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    /// Whether the run ended early at the caller's request or deadline.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut)
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed generation call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    /// Fragments in the order they were yielded.
    pub fragments: Vec<String>,
    /// Every sampled token, including ones whose text was held back.
    pub tokens: Vec<TokenId>,
    pub prompt_tokens: usize,
    pub finish_reason: FinishReason,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl GenerationResult {
    pub(crate) fn empty(prompt_tokens: usize, finish_reason: FinishReason) -> Self {
        Self {
            fragments: Vec::new(),
            tokens: Vec::new(),
            prompt_tokens,
            finish_reason,
            elapsed: Duration::ZERO,
        }
    }

    /// Concatenation of all fragments.
    pub fn text(&self) -> String {
        self.fragments.concat()
    }

    pub fn tokens_generated(&self) -> usize {
        self.tokens.len()
    }
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
