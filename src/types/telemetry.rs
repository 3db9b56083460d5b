//! Token accounting types shared by the provider layer and the tracker.

use serde::{Deserialize, Serialize};

use crate::llm::ProviderKind;

/// Token usage for a single provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Portion of input served from the provider's context cache
    pub cached_input_tokens: u64,
    pub total_tokens: u64,
    pub latency_ms: u64,
    pub provider: ProviderKind,
    pub model: String,
}

impl TokenUsage {
    /// Input tokens billed at the full (uncached) rate.
    pub fn fresh_input_tokens(&self) -> u64 {
        self.input_tokens.saturating_sub(self.cached_input_tokens)
    }
}

/// Accumulated totals for one rolling bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTotals {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_input_tokens: u64,
    pub total_tokens: u64,
    pub total_latency_ms: u64,
}

impl BucketTotals {
    pub fn add(&mut self, usage: &TokenUsage) {
        self.calls += 1;
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.cached_input_tokens += usage.cached_input_tokens;
        self.total_tokens += usage.total_tokens;
        self.total_latency_ms += usage.latency_ms;
    }

    pub fn avg_latency_ms(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total_latency_ms / self.calls
        }
    }
}

/// Snapshot of the four rolling buckets, returned by `get_token_stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub last_minute: BucketTotals,
    pub last_hour: BucketTotals,
    pub last_day: BucketTotals,
    pub lifetime: BucketTotals,
    /// Breaker state string surfaced alongside stats ("closed" etc.)
    #[serde(default)]
    pub breaker_state: String,
}
