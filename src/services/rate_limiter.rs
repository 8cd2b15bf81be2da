//! Sliding-window rate limiter
//!
//! Keeps the timestamps of recent requests per key in memory. State lives for
//! the lifetime of the process; a restart forgets every window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Rate limiter allowing at most `max_requests` per key within `window`
pub struct SlidingWindowLimiter {
    attempts: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Telegram updates: `per_minute` updates per chat
    pub fn per_minute(per_minute: usize) -> Self {
        Self::new(per_minute, Duration::minutes(1))
    }

    /// Record a request for `key` if it is still under the limit.
    ///
    /// Returns `true` when the request is allowed. Rejected requests are not
    /// recorded, so a blocked caller regains access as soon as the oldest
    /// allowed request leaves the window.
    pub async fn check_and_record(&self, key: &str) -> bool {
        self.check_and_record_at(key, Utc::now()).await
    }

    async fn check_and_record_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut attempts = self.attempts.write().await;
        let cutoff = now - self.window;

        let key_attempts = attempts.entry(key.to_string()).or_default();
        key_attempts.retain(|time| *time > cutoff);

        if key_attempts.len() >= self.max_requests {
            return false;
        }
        key_attempts.push(now);
        true
    }

    /// Drop expired timestamps and empty keys
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, times| {
            times.retain(|time| *time > cutoff);
            !times.is_empty()
        });
    }

    /// Number of keys currently tracked
    pub async fn tracked_keys(&self) -> usize {
        self.attempts.read().await.len()
    }
}
