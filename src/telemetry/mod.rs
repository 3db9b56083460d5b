//! Telemetry: token accounting and the API call log.
//!
//! Strictly off the critical path — every write failure here is logged and
//! swallowed so a full disk can never stall a decision cycle.

mod api_log;
mod tracker;

pub use api_log::ApiCallLog;
pub use tracker::{append_stats_jsonl, TokenTracker};
