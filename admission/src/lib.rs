//! Per-client admission control over a fixed sliding window.
//!
//! Every inbound request is checked against a per-IP log of request
//! timestamps covering the last 60 seconds. The check-and-record step is a
//! single critical section so that two concurrent requests from the same
//! client cannot both claim the last remaining slot.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Window over which per-client request counts are measured.
const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window request limiter keyed by client identifier.
///
/// Timestamps older than the window are pruned lazily on each check;
/// pruning is a read-side effect, so a client's remaining budget recovers
/// without any new request being recorded.
pub struct RateLimiter {
    enabled: bool,
    limit: usize,
    requests: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(enabled: bool, limit: usize) -> Self {
        Self {
            enabled,
            limit,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Checks whether `key` has exhausted its quota.
    ///
    /// Returns true when the client is over its limit; the rejected attempt
    /// is not recorded. Otherwise the current timestamp is appended and the
    /// request is admitted.
    pub fn is_limited(&self, key: &str) -> bool {
        self.is_limited_at(key, Instant::now())
    }

    fn is_limited_at(&self, key: &str, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }

        let mut requests = self.requests.lock().unwrap();
        let log = requests.entry(key.to_string()).or_default();
        prune(log, now);

        if log.len() >= self.limit {
            metrics::counter!("admission.rejected").increment(1);
            tracing::debug!(client = key, "request over quota");
            return true;
        }

        log.push(now);
        false
    }

    /// Requests left in the current window, or -1 when the limiter is
    /// disabled (unlimited).
    pub fn remaining(&self, key: &str) -> i64 {
        self.remaining_at(key, Instant::now())
    }

    fn remaining_at(&self, key: &str, now: Instant) -> i64 {
        if !self.enabled {
            return -1;
        }

        let mut requests = self.requests.lock().unwrap();
        let Some(log) = requests.get_mut(key) else {
            return self.limit as i64;
        };
        prune(log, now);
        let count = log.len();
        if log.is_empty() {
            // Opportunistic GC of idle clients.
            requests.remove(key);
        }

        (self.limit as i64 - count as i64).max(0)
    }

    /// Time until the oldest retained timestamp leaves the window, i.e.
    /// when the client's budget next increases. `None` when disabled or
    /// when the client has no retained timestamps.
    pub fn reset_time(&self, key: &str) -> Option<Duration> {
        self.reset_time_at(key, Instant::now())
    }

    fn reset_time_at(&self, key: &str, now: Instant) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        let requests = self.requests.lock().unwrap();
        let oldest = requests.get(key)?.iter().min()?;
        Some(WINDOW.saturating_sub(now.duration_since(*oldest)))
    }
}

/// Drops timestamps that have aged past the window.
fn prune(log: &mut Vec<Instant>, now: Instant) {
    log.retain(|stamp| now.duration_since(*stamp) < WINDOW);
}
