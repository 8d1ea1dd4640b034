// Adaptive heartbeat tracking for the feed connection, grounded on the
// connection-quality scoring used by the original CoinGlass client.

use std::time::{Duration, Instant};

pub struct HeartbeatTracker {
    interval_sec: u64,
    min_interval_sec: u64,
    max_interval_sec: u64,
    base_interval_sec: u64,
    pong_timeout_sec: u64,
    success_count: u64,
    failure_count: u64,
    consecutive_failures: u32,
    avg_response_ms: f64,
    last_sent: Option<Instant>,
    awaiting_reply: bool,
}

impl HeartbeatTracker {
    pub fn new(
        base_interval_sec: u64,
        min_interval_sec: u64,
        max_interval_sec: u64,
        pong_timeout_sec: u64,
    ) -> Self {
        Self {
            interval_sec: base_interval_sec,
            min_interval_sec,
            max_interval_sec,
            base_interval_sec,
            pong_timeout_sec,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            avg_response_ms: 1000.0,
            last_sent: None,
            awaiting_reply: false,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_sec)
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent = Some(now);
        self.awaiting_reply = true;
    }

    /// Record a pong reply and recompute interval/quality. Returns the new
    /// connection-quality score.
    pub fn record_reply(&mut self, now: Instant) -> f64 {
        let response_ms = self
            .last_sent
            .map(|sent| now.duration_since(sent).as_secs_f64() * 1000.0)
            .unwrap_or(self.avg_response_ms);

        self.success_count += 1;
        self.consecutive_failures = 0;
        self.awaiting_reply = false;
        self.avg_response_ms = 0.3 * response_ms + 0.7 * self.avg_response_ms;

        let quality = self.quality_score();
        self.interval_sec = self.recompute_interval(quality);
        quality
    }

    /// Record a missed pong (no reply within the pong timeout). Returns the
    /// new consecutive-failure count; the caller declares the connection
    /// dead once this reaches 3.
    pub fn record_timeout(&mut self) -> u32 {
        self.failure_count += 1;
        self.consecutive_failures += 1;
        let quality = self.quality_score();
        self.interval_sec = self.recompute_interval(quality);
        self.consecutive_failures
    }

    /// Check whether the most recently sent ping has gone unanswered for
    /// longer than the configured pong timeout; if so, record it as a
    /// timeout and clear the wait. Returns whether a timeout was recorded.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if !self.awaiting_reply {
            return false;
        }
        let overdue = self
            .last_sent
            .map(|sent| now.duration_since(sent).as_secs() >= self.pong_timeout_sec)
            .unwrap_or(false);
        if overdue {
            self.awaiting_reply = false;
            self.record_timeout();
            true
        } else {
            false
        }
    }

    pub fn is_dead(&self) -> bool {
        self.consecutive_failures >= 3
    }

    fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    fn quality_score(&self) -> f64 {
        let time_score = (1.0 - (self.avg_response_ms / 1000.0 - 1.0) / 4.0).clamp(0.0, 1.0);
        (0.7 * self.success_rate() + 0.3 * time_score).clamp(0.0, 1.0)
    }

    fn recompute_interval(&self, quality: f64) -> u64 {
        let base = self.base_interval_sec as f64;
        let raw = if quality >= 0.8 {
            base * 1.5
        } else if quality >= 0.6 {
            base
        } else if quality >= 0.4 {
            base * 0.7
        } else {
            self.min_interval_sec as f64
        };
        (raw as u64).clamp(self.min_interval_sec, self.max_interval_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_timeouts_declare_dead() {
        let mut hb = HeartbeatTracker::new(20, 10, 60, 60);
        assert!(!hb.is_dead());
        hb.record_timeout();
        hb.record_timeout();
        assert!(!hb.is_dead());
        hb.record_timeout();
        assert!(hb.is_dead());
    }

    #[test]
    fn a_successful_reply_resets_consecutive_failures() {
        let mut hb = HeartbeatTracker::new(20, 10, 60, 60);
        hb.record_timeout();
        hb.record_timeout();
        hb.mark_sent(Instant::now());
        hb.record_reply(Instant::now());
        assert!(!hb.is_dead());
    }

    #[test]
    fn interval_stays_within_configured_bounds() {
        let mut hb = HeartbeatTracker::new(20, 10, 60, 60);
        for _ in 0..10 {
            hb.mark_sent(Instant::now());
            hb.record_reply(Instant::now());
        }
        let secs = hb.interval().as_secs();
        assert!(secs >= 10 && secs <= 60);
    }

    #[test]
    fn check_timeout_is_a_noop_before_a_ping_is_sent() {
        let mut hb = HeartbeatTracker::new(20, 10, 60, 60);
        assert!(!hb.check_timeout(Instant::now()));
        assert!(!hb.is_dead());
    }

    #[test]
    fn check_timeout_records_a_failure_once_the_deadline_passes() {
        let mut hb = HeartbeatTracker::new(20, 10, 60, 0);
        let sent_at = Instant::now();
        hb.mark_sent(sent_at);
        assert!(hb.check_timeout(Instant::now()));
        assert_eq!(hb.consecutive_failures, 1);
        // a second check before another ping is sent must not double-count
        assert!(!hb.check_timeout(Instant::now()));
        assert_eq!(hb.consecutive_failures, 1);
    }
}
