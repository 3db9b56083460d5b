//! Rolling token-usage tracker.
//!
//! Keeps one entry per LLM call for the last 24 hours plus lifetime totals,
//! and derives the minute/hour/day buckets on demand. At tens of calls per
//! hour the linear scan is irrelevant next to the calls themselves.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{error, warn};

use crate::types::{BucketTotals, TokenStats, TokenUsage};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct CallEntry {
    at: Instant,
    input_tokens: u64,
    output_tokens: u64,
    cached_input_tokens: u64,
    total_tokens: u64,
    latency_ms: u64,
}

#[derive(Debug, Default)]
pub struct TokenTracker {
    calls: VecDeque<CallEntry>,
    lifetime: BucketTotals,
}

impl TokenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one call's usage into the tracker.
    pub fn record(&mut self, usage: &TokenUsage) {
        self.lifetime.add(usage);
        self.calls.push_back(CallEntry {
            at: Instant::now(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cached_input_tokens: usage.cached_input_tokens,
            total_tokens: usage.total_tokens,
            latency_ms: usage.latency_ms,
        });
        self.trim();
    }

    fn trim(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.calls.front() {
            if now.duration_since(front.at) > DAY {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn bucket_since(&self, window: Duration) -> BucketTotals {
        let now = Instant::now();
        let mut totals = BucketTotals::default();
        for call in self.calls.iter().rev() {
            if now.duration_since(call.at) > window {
                break;
            }
            totals.calls += 1;
            totals.input_tokens += call.input_tokens;
            totals.output_tokens += call.output_tokens;
            totals.cached_input_tokens += call.cached_input_tokens;
            totals.total_tokens += call.total_tokens;
            totals.total_latency_ms += call.latency_ms;
        }
        totals
    }

    /// Snapshot of all four buckets.
    pub fn snapshot(&mut self, breaker_state: String) -> TokenStats {
        self.trim();
        TokenStats {
            last_minute: self.bucket_since(MINUTE),
            last_hour: self.bucket_since(HOUR),
            last_day: self.bucket_since(DAY),
            lifetime: self.lifetime,
            breaker_state,
        }
    }

    pub fn lifetime(&self) -> BucketTotals {
        self.lifetime
    }
}

/// Append one stats snapshot as a JSON line (the `token_usage.jsonl`
/// companion file). Failures are logged, never raised.
pub fn append_stats_jsonl(path: &Path, stats: &TokenStats) {
    let line = match serde_json::to_string(stats) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "token stats serialization failed");
            return;
        }
    };
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{line}"));
    if let Err(e) = result {
        error!(path = %path.display(), error = %e, "token stats append failed");
    }
}
