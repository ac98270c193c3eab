// ABOUTME: Tracks inbound/outbound LEASE windows and gates requests against them
// ABOUTME: A stateful manager holding its config, counters, and a plain statistics snapshot

use std::time::Instant;

use crate::frame::LeaseFrame;

/// A single granted lease: `allowed_requests` permits, valid until `received_at + ttl`.
#[derive(Debug, Clone, Copy)]
struct Lease {
    allowed_requests: u32,
    ttl_ms: u32,
    received_at: Instant,
}

impl Lease {
    fn is_valid(&self, now: Instant) -> bool {
        self.allowed_requests > 0 && now.duration_since(self.received_at).as_millis() < self.ttl_ms as u128
    }
}

/// Statistics for lease admission, tracked at the same granularity a rate-adjustment
/// policy would need to react to rejected or exhausted leases.
#[derive(Debug, Clone, Default)]
pub struct LeaseStatistics {
    pub leases_received: u64,
    pub leases_granted: u64,
    pub requests_admitted: u64,
    pub requests_rejected: u64,
    pub outbound_requests_admitted: u64,
    pub outbound_requests_rejected: u64,
}

/// Configuration for LEASE admission control.
#[derive(Debug, Clone, Copy)]
pub struct LeaseConfig {
    /// Whether this side honors LEASE at all; when false, `try_admit` always succeeds and
    /// no LEASE frames are ever sent by this side's `grant`.
    pub enabled: bool,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// Tracks the inbound lease (permits the peer has granted *us* to send requests) and the
/// outbound lease (permits *we* have granted the peer), each independently.
#[derive(Debug)]
pub struct LeaseManager {
    config: LeaseConfig,
    inbound: Option<Lease>,
    outbound_allowed_requests: u32,
    outbound_ttl_ms: u32,
    outbound_granted_at: Option<Instant>,
    statistics: LeaseStatistics,
}

impl LeaseManager {
    pub fn new(config: LeaseConfig) -> Self {
        Self {
            config,
            inbound: None,
            outbound_allowed_requests: 0,
            outbound_ttl_ms: 0,
            outbound_granted_at: None,
            statistics: LeaseStatistics::default(),
        }
    }

    pub fn config(&self) -> LeaseConfig {
        self.config
    }

    /// Records a LEASE frame from the peer, atomically replacing any prior inbound lease.
    pub fn receive_lease(&mut self, frame: &LeaseFrame) {
        self.statistics.leases_received += 1;
        self.inbound = Some(Lease {
            allowed_requests: frame.allowed_requests,
            ttl_ms: frame.ttl_ms,
            received_at: Instant::now(),
        });
    }

    /// True if the caller may send one more request right now. If lease admission is
    /// disabled, always true. On success, decrements the remaining permit count.
    pub fn try_admit(&mut self, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }
        match &mut self.inbound {
            Some(lease) if lease.is_valid(now) => {
                lease.allowed_requests -= 1;
                self.statistics.requests_admitted += 1;
                true
            }
            _ => {
                self.statistics.requests_rejected += 1;
                false
            }
        }
    }

    /// Grants a new outbound lease to the peer, to be encoded into a `LEASE` frame by the
    /// caller and sent on stream 0.
    pub fn grant(&mut self, allowed_requests: u32, ttl_ms: u32) -> LeaseFrame {
        self.outbound_allowed_requests = allowed_requests;
        self.outbound_ttl_ms = ttl_ms;
        self.outbound_granted_at = Some(Instant::now());
        self.statistics.leases_granted += 1;
        LeaseFrame {
            ttl_ms,
            allowed_requests,
            metadata: None,
        }
    }

    /// Responder-side check: true if the lease we granted the peer still permits one more
    /// inbound new-stream request right now. Decrements the outbound counter on success.
    pub fn try_admit_outbound(&mut self, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }
        let valid = self.outbound_allowed_requests > 0
            && self
                .outbound_granted_at
                .is_some_and(|at| now.duration_since(at).as_millis() < self.outbound_ttl_ms as u128);
        if valid {
            self.outbound_allowed_requests -= 1;
            self.statistics.outbound_requests_admitted += 1;
            true
        } else {
            self.statistics.outbound_requests_rejected += 1;
            false
        }
    }

    pub fn statistics(&self) -> &LeaseStatistics {
        &self.statistics
    }
}
