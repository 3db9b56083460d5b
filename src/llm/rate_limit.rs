//! Call pacing: the min-interval gate and the sliding RPM window.
//!
//! Both are cooperative — a call that would violate a limit suspends on the
//! loop until it may proceed. Nothing here is thread-safe by design; the
//! engine owns one of each and serializes access. Timing uses the runtime
//! clock, so paused-clock tests exercise the real wait logic.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

// ============================================================================
// Min-Interval Pacer
// ============================================================================

/// Enforces the configured minimum spacing between decision calls.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    pub fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }

    /// How long a call starting at `now` must still wait.
    pub fn delay_needed(&self, now: Instant) -> Duration {
        match self.last_call {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                self.min_interval.saturating_sub(elapsed)
            }
        }
    }

    /// Suspend until the interval has elapsed, then mark the call.
    pub async fn pace(&mut self) {
        let wait = self.delay_needed(Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.last_call = Some(Instant::now());
    }

    /// Forget the last call (emergency stop resets in-flight pacing state).
    pub fn reset(&mut self) {
        self.last_call = None;
    }
}

// ============================================================================
// Sliding RPM Window
// ============================================================================

/// Transport-layer requests-per-minute limiter.
#[derive(Debug)]
pub struct RequestWindow {
    limit: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RequestWindow {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            limit: limit as usize,
            window: Duration::from_secs(60),
            timestamps: VecDeque::new(),
        }
    }

    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit as usize;
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.timestamps.front() {
            if now.saturating_duration_since(*front) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long a request arriving at `now` must wait for a slot.
    pub fn delay_needed(&mut self, now: Instant) -> Duration {
        self.evict(now);
        if self.timestamps.len() < self.limit {
            return Duration::ZERO;
        }
        match self.timestamps.front() {
            Some(oldest) => self
                .window
                .saturating_sub(now.saturating_duration_since(*oldest)),
            None => Duration::ZERO,
        }
    }

    /// Suspend until a slot is free, then occupy it.
    pub async fn admit(&mut self) {
        loop {
            let wait = self.delay_needed(Instant::now());
            if wait.is_zero() {
                break;
            }
            tokio::time::sleep(wait).await;
        }
        self.timestamps.push_back(Instant::now());
    }

    pub fn in_flight_count(&self) -> usize {
        self.timestamps.len()
    }
}
