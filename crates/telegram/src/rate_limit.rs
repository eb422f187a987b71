//! Per-user rate limiting for inline keyboard presses

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::constants::RATE_LIMIT_SECONDS;

/// Remembers when each user last got through
pub struct RateLimiter {
    last_seen: RwLock<HashMap<u64, Instant>>,
    interval: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(RATE_LIMIT_SECONDS))
    }
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_seen: RwLock::new(HashMap::new()),
            interval,
        }
    }

    /// Returns `true` if the user may proceed, recording the attempt
    pub fn check(&self, user_id: u64) -> bool {
        let now = Instant::now();
        let mut last_seen = self.last_seen.write().unwrap_or_else(|e| e.into_inner());

        if let Some(&previous) = last_seen.get(&user_id) {
            if now.duration_since(previous) < self.interval {
                return false;
            }
        }

        // Entries older than a minute are stale for any sane interval
        if last_seen.len() > 1024 {
            let horizon = self.interval.max(Duration::from_secs(60));
            last_seen.retain(|_, seen| now.duration_since(*seen) < horizon);
        }
        last_seen.insert(user_id, now);
        true
    }
}

static RATE_LIMITER: std::sync::OnceLock<RateLimiter> = std::sync::OnceLock::new();

/// Check the process-wide limiter
pub fn check_rate_limit(user_id: u64) -> bool {
    RATE_LIMITER.get_or_init(RateLimiter::default).check(user_id)
}
