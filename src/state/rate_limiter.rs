use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

/// Default rolling window length.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_millis(10_000);
/// Default number of requests allowed inside the window.
pub const DEFAULT_RATE_MAX_REQUESTS: usize = 10;

/// Sliding-window limiter shared by every server.
///
/// Only tracks issue timestamps; nothing is persisted, so a restart starts
/// from an empty window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    issued: VecDeque<Instant>,
}

/// Point-in-time view of the limiter budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub used: usize,
    pub max: usize,
    pub available: usize,
    pub next_slot: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW, DEFAULT_RATE_MAX_REQUESTS)
    }
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per rolling `window`.
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            issued: VecDeque::with_capacity(max_requests + 1),
        }
    }

    /// Whether a request may be issued right now.
    pub fn can_proceed(&mut self) -> bool {
        self.can_proceed_at(Instant::now())
    }

    /// Delay until a slot frees up, zero when one is available.
    pub fn time_until_slot(&mut self) -> Duration {
        self.time_until_slot_at(Instant::now())
    }

    /// Account for a request issued now.
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Current budget usage.
    pub fn status(&mut self) -> RateLimitStatus {
        let now = Instant::now();
        self.prune(now);
        let used = self.issued.len();
        RateLimitStatus {
            used,
            max: self.max_requests,
            available: self.max_requests.saturating_sub(used),
            next_slot: self.time_until_slot_at(now),
        }
    }

    pub(crate) fn can_proceed_at(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.issued.len() < self.max_requests
    }

    pub(crate) fn time_until_slot_at(&mut self, now: Instant) -> Duration {
        if self.can_proceed_at(now) {
            return Duration::ZERO;
        }

        match self.issued.front() {
            Some(oldest) => self
                .window
                .saturating_sub(now.saturating_duration_since(*oldest)),
            None => Duration::ZERO,
        }
    }

    pub(crate) fn record_at(&mut self, now: Instant) {
        self.prune(now);
        self.issued.push_back(now);
    }

    /// Drop timestamps that fell out of the window.
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.issued.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                self.issued.pop_front();
            } else {
                break;
            }
        }
    }
}
