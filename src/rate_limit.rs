//! Fixed-window request counting per API key.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;

const WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub current_count: u64,
    pub limit: u32,
    pub remaining: u64,
    /// Seconds until the current window closes.
    pub reset_seconds: u64,
}

/// Counters keyed by `(key_id, minute bucket)`. The entry lock taken by
/// `DashMap::entry` makes each increment atomic; it is never held across
/// an await.
pub struct RateLimiter {
    windows: DashMap<(String, i64), u64>,
    calls: AtomicU64,
    prune_every: u64,
}

impl RateLimiter {
    pub fn new(prune_every: u64) -> Self {
        Self {
            windows: DashMap::new(),
            calls: AtomicU64::new(0),
            prune_every: prune_every.max(1),
        }
    }

    pub fn check_and_increment(&self, key_id: &str, limit_per_minute: u32) -> RateLimitDecision {
        self.check_and_increment_at(key_id, limit_per_minute, Utc::now().timestamp())
    }

    /// Same as `check_and_increment` for an explicit unix time in seconds.
    /// Rejected calls still count toward the window.
    pub fn check_and_increment_at(
        &self,
        key_id: &str,
        limit_per_minute: u32,
        now_secs: i64,
    ) -> RateLimitDecision {
        let bucket = now_secs.div_euclid(WINDOW_SECS);
        let current_count = {
            let mut count = self
                .windows
                .entry((key_id.to_string(), bucket))
                .or_insert(0);
            *count += 1;
            *count
        };

        if self.calls.fetch_add(1, Ordering::Relaxed) % self.prune_every == 0 {
            self.prune_before(bucket);
        }

        let limit = limit_per_minute as u64;
        RateLimitDecision {
            allowed: current_count <= limit,
            current_count,
            limit: limit_per_minute,
            remaining: limit.saturating_sub(current_count),
            reset_seconds: (WINDOW_SECS - now_secs.rem_euclid(WINDOW_SECS)) as u64,
        }
    }

    fn prune_before(&self, bucket: i64) {
        let before = self.windows.len();
        self.windows.retain(|(_, b), _| *b >= bucket);
        let pruned = before.saturating_sub(self.windows.len());
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned stale rate-limit windows");
        }
    }

    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(1024)
    }
}
