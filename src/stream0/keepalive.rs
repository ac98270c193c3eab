// ABOUTME: Keepalive liveness tracking: when to send, when a missed-ack threshold is fatal
// ABOUTME: Polling-model manager, tracking ping/ack liveness without a background timer task

use std::time::{Duration, Instant};

/// Configuration for KEEPALIVE liveness detection, negotiated via SETUP's
/// `keepalive_interval_ms`/`max_lifetime_ms` fields.
#[derive(Debug, Clone, Copy)]
pub struct KeepaliveConfig {
    /// Interval between outbound KEEPALIVE frames.
    pub interval: Duration,
    /// Consecutive un-acked keepalives after which the connection is fatally dead.
    pub missed_threshold: u32,
}

impl KeepaliveConfig {
    pub fn new(interval: Duration, missed_threshold: u32) -> Self {
        Self {
            interval,
            missed_threshold,
        }
    }
}

/// Plain snapshot of ping/ack counters and the current consecutive-miss streak.
#[derive(Debug, Clone)]
pub struct KeepaliveStatus {
    pub consecutive_missed: u32,
    pub total_sent: u32,
    pub total_acked: u32,
}

/// Tracks when the next outbound KEEPALIVE is due and how many have gone unanswered.
/// Integration is poll-based: the connection driver calls [`should_ping`] on its own
/// tick and reports outcomes back via [`on_ping_sent`]/[`on_ack_received`].
#[derive(Debug)]
pub struct KeepaliveTracker {
    config: KeepaliveConfig,
    last_sent: Option<Instant>,
    consecutive_missed: u32,
    total_sent: u32,
    total_acked: u32,
}

impl KeepaliveTracker {
    pub fn new(config: KeepaliveConfig) -> Self {
        Self {
            config,
            last_sent: None,
            consecutive_missed: 0,
            total_sent: 0,
            total_acked: 0,
        }
    }

    /// True once `interval` has elapsed since the last KEEPALIVE was sent (or none has
    /// been sent yet).
    pub fn should_ping(&self) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => last.elapsed() >= self.config.interval,
        }
    }

    pub fn on_ping_sent(&mut self) {
        self.last_sent = Some(Instant::now());
        self.total_sent += 1;
        self.consecutive_missed += 1;
    }

    /// Called when the peer's RESPOND-flagged echo arrives.
    pub fn on_ack_received(&mut self) {
        self.consecutive_missed = 0;
        self.total_acked += 1;
    }

    /// True once `missed_threshold` consecutive pings have gone unanswered — the
    /// connection driver treats this as fatal and tears the connection down with a
    /// `CONNECTION_ERROR`.
    pub fn is_dead(&self) -> bool {
        self.consecutive_missed >= self.config.missed_threshold
    }

    pub fn status(&self) -> KeepaliveStatus {
        KeepaliveStatus {
            consecutive_missed: self.consecutive_missed,
            total_sent: self.total_sent,
            total_acked: self.total_acked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pings_immediately_when_never_sent() {
        let tracker = KeepaliveTracker::new(KeepaliveConfig::new(Duration::from_secs(30), 3));
        assert!(tracker.should_ping());
    }

    #[test]
    fn does_not_ping_again_before_interval_elapses() {
        let mut tracker = KeepaliveTracker::new(KeepaliveConfig::new(Duration::from_millis(50), 3));
        tracker.on_ping_sent();
        assert!(!tracker.should_ping());
        std::thread::sleep(Duration::from_millis(60));
        assert!(tracker.should_ping());
    }

    #[test]
    fn ack_resets_missed_count() {
        let mut tracker = KeepaliveTracker::new(KeepaliveConfig::new(Duration::from_secs(30), 3));
        tracker.on_ping_sent();
        tracker.on_ping_sent();
        assert_eq!(tracker.status().consecutive_missed, 2);
        tracker.on_ack_received();
        assert_eq!(tracker.status().consecutive_missed, 0);
    }

    #[test]
    fn declared_dead_after_missed_threshold() {
        let mut tracker = KeepaliveTracker::new(KeepaliveConfig::new(Duration::from_secs(30), 3));
        assert!(!tracker.is_dead());
        tracker.on_ping_sent();
        tracker.on_ping_sent();
        assert!(!tracker.is_dead());
        tracker.on_ping_sent();
        assert!(tracker.is_dead());
    }
}
