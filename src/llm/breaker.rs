//! Circuit breaker for the provider path.
//!
//! `Closed → Open` after the failure threshold, `Open → HalfOpen` only on
//! explicit redeploy, `HalfOpen → Closed` when the probe call succeeds.
//! Once open, the breaker persists until that explicit reset; there is no
//! time-based self-healing, because a stalled commander is cheaper than a
//! runaway API bill.

use serde::Serialize;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Probe state entered on redeploy; the next call decides
    HalfOpen,
    /// Calls are rejected without touching the network
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half_open",
            CircuitState::Open => "open",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether an outbound call is permitted right now.
    pub fn allows_call(&self) -> bool {
        self.state != CircuitState::Open
    }

    /// Record a successful call. Closes the breaker from any permissive
    /// state and resets the failure counter.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
    }

    /// Record a failed call. A HalfOpen probe failure reopens immediately;
    /// otherwise the counter climbs toward the threshold.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.state == CircuitState::HalfOpen
            || self.consecutive_failures >= self.failure_threshold
        {
            self.state = CircuitState::Open;
        }
    }

    /// Force the breaker open (admin emergency stop).
    pub fn trip(&mut self) {
        self.state = CircuitState::Open;
    }

    /// Explicit redeploy: move Open → HalfOpen so the next call probes.
    /// A breaker that is not open stays where it is.
    pub fn redeploy(&mut self) {
        if self.state == CircuitState::Open {
            self.state = CircuitState::HalfOpen;
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3)
    }
}
