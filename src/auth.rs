// =============================================================================
// Outbound authentication helpers: constant-time credential comparison and a
// requests-per-minute limiter guarding chat-sink dispatches.
// =============================================================================

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

/// Compare two credentials in constant time. Used to enforce that the
/// chat-sink token never equals another credential the process holds.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

pub fn credentials_distinct(a: &str, b: &str) -> bool {
    !constant_time_eq(a.as_bytes(), b.as_bytes())
}

const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 60;

/// Sliding-minute rate limiter guarding outbound chat-sink calls.
pub struct RateLimitTracker {
    max_per_minute: u32,
    window_start_epoch_sec: AtomicU64,
    count_in_window: AtomicU32,
}

impl RateLimitTracker {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            window_start_epoch_sec: AtomicU64::new(now_epoch_sec()),
            count_in_window: AtomicU32::new(0),
        }
    }

    /// Returns true and records the attempt if it is allowed; returns false
    /// (without recording) if the per-minute ceiling would be exceeded.
    pub fn try_acquire(&self) -> bool {
        let now = now_epoch_sec();
        let window_start = self.window_start_epoch_sec.load(Ordering::Relaxed);
        if now.saturating_sub(window_start) >= 60 {
            self.window_start_epoch_sec.store(now, Ordering::Relaxed);
            self.count_in_window.store(0, Ordering::Relaxed);
        }

        let count = self.count_in_window.fetch_add(1, Ordering::Relaxed) + 1;
        if count > self.max_per_minute {
            warn!(count, limit = self.max_per_minute, "outbound rate limit exceeded");
            self.count_in_window.fetch_sub(1, Ordering::Relaxed);
            false
        } else {
            true
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS_PER_MINUTE)
    }
}

fn now_epoch_sec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_identical() {
        assert!(constant_time_eq(b"token", b"token"));
    }

    #[test]
    fn constant_time_eq_different() {
        assert!(!constant_time_eq(b"token-a", b"token-b"));
    }

    #[test]
    fn constant_time_eq_different_lengths() {
        assert!(!constant_time_eq(b"short", b"much longer value"));
    }

    #[test]
    fn credentials_distinct_detects_equal_tokens() {
        assert!(!credentials_distinct("same", "same"));
        assert!(credentials_distinct("a", "b"));
    }

    #[test]
    fn rate_limiter_blocks_beyond_ceiling() {
        let tracker = RateLimitTracker::new(3);
        assert!(tracker.try_acquire());
        assert!(tracker.try_acquire());
        assert!(tracker.try_acquire());
        assert!(!tracker.try_acquire());
    }
}
