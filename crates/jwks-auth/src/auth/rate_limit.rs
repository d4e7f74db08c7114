//! Rolling-window budget for outbound JWKS fetches.
//!
//! Records the time of every permitted fetch and allows a new one only while
//! fewer than `max_fetches` fall inside the trailing `window`. Exhaustion
//! fails fast; callers never wait for budget.
//!
//! Time comes from `tokio::time::Instant` so tests can pause and advance it.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Process-wide fetch budget shared by all verifications.
#[derive(Debug)]
pub struct FetchRateLimiter {
    max_fetches: u32,
    window: Duration,
    /// Timestamps of permitted fetches inside the current window, oldest first.
    recent: Mutex<VecDeque<Instant>>,
}

impl FetchRateLimiter {
    /// Allow at most `max_fetches` fetches in any trailing `window`.
    pub fn new(max_fetches: u32, window: Duration) -> Self {
        Self {
            max_fetches,
            window,
            // Grows with use; the budget may be far larger than what is ever spent
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Consume one unit of budget if any is left.
    ///
    /// Returns `false` without blocking when the budget is exhausted.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut recent, now);

        if recent.len() >= self.max_fetches as usize {
            return false;
        }

        recent.push_back(now);
        true
    }

    /// Units of budget available right now.
    pub fn remaining(&self) -> u32 {
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut recent, Instant::now());
        let used = u32::try_from(recent.len()).unwrap_or(u32::MAX);
        self.max_fetches.saturating_sub(used)
    }

    pub fn max_fetches(&self) -> u32 {
        self.max_fetches
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn prune(&self, recent: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = recent.front() {
            if now.duration_since(*oldest) >= self.window {
                recent.pop_front();
            } else {
                break;
            }
        }
    }
}
