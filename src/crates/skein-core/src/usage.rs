//! Token usage accounting
//!
//! Every model call reports a [`UsageMetadata`]. The executor records each
//! report with the [`TokenAggregator`], which produces the canonical run
//! totals. Consumers must read totals from the aggregated
//! [`UsageTotals`] (surfaced on `WorkflowResult`), never from the last
//! node's per-call metadata.
//!
//! Providers disagree on field spelling; `input_tokens`/`prompt_tokens` and
//! `output_tokens`/`completion_tokens` both deserialize into the same
//! fields.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Token usage for a single model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Tokens in the prompt
    #[serde(alias = "input_tokens", alias = "prompt_tokens", alias = "promptTokens")]
    pub input_tokens: u64,
    /// Tokens in the completion
    #[serde(
        alias = "output_tokens",
        alias = "completion_tokens",
        alias = "completionTokens"
    )]
    pub output_tokens: u64,
    /// Total as reported by the provider; derived when absent
    #[serde(default, alias = "total_tokens", skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl UsageMetadata {
    /// Usage with the given prompt/completion counts
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: None,
        }
    }

    /// Provider-reported total when present, sum otherwise
    pub fn total(&self) -> u64 {
        self.total_tokens
            .unwrap_or(self.input_tokens + self.output_tokens)
    }
}

/// Canonical totals for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    /// Sum of prompt tokens across model calls
    pub prompt_tokens: u64,
    /// Sum of completion tokens across model calls
    pub completion_tokens: u64,
    /// `prompt_tokens + completion_tokens`
    pub tokens_used: u64,
}

/// Deduplicating usage accumulator
///
/// Usage reports are keyed by the id of the `UsageRecorded` event that
/// carried them; recording the same id twice is a no-op, so replayed or
/// double-delivered events cannot inflate totals.
#[derive(Debug, Default)]
pub struct TokenAggregator {
    seen: HashSet<String>,
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl TokenAggregator {
    /// Empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one usage report; returns false for a duplicate event id
    pub fn record(&mut self, event_id: &str, usage: &UsageMetadata) -> bool {
        if !self.seen.insert(event_id.to_string()) {
            return false;
        }
        self.prompt_tokens += usage.input_tokens;
        self.completion_tokens += usage.output_tokens;
        true
    }

    /// Number of distinct reports recorded
    pub fn recorded(&self) -> usize {
        self.seen.len()
    }

    /// Current canonical totals
    pub fn totals(&self) -> UsageTotals {
        UsageTotals {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            tokens_used: self.prompt_tokens + self.completion_tokens,
        }
    }
}
