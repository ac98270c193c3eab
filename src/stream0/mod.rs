//! Stream-0 Handler: SETUP negotiation, KEEPALIVE liveness, LEASE dispatch, and
//! connection-fatal ERROR(0) handling. Everything here operates on stream id 0 only —
//! per-stream traffic is routed to the Requester/Responder by the multiplexer.

pub mod keepalive;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::ConnectionConfig;
use crate::error::{RSocketError, Result};
use crate::frame::{ErrorFrame, Frame, KeepaliveFrame, LeaseFrame, SetupFrame};
use crate::lease_manager::{LeaseConfig, LeaseManager};

use keepalive::{KeepaliveConfig, KeepaliveTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream0State {
    AwaitingSetup,
    Active,
    Closed,
}

/// Owns stream-0 state for one connection: the setup handshake, the keepalive tracker,
/// and the lease manager. Lives on the connection driver task; never touches per-stream
/// state owned by the Requester/Responder.
pub struct Stream0Handler {
    state: Stream0State,
    config: ConnectionConfig,
    keepalive: KeepaliveTracker,
    /// Shared with the Requester, which consults it before allocating a new stream —
    /// inbound LEASE frames land here and must be visible on both sides immediately.
    pub lease_manager: Arc<Mutex<LeaseManager>>,
}

impl Stream0Handler {
    /// For the side that already sent (or doesn't need to receive) SETUP — starts ACTIVE.
    pub fn new_active(config: ConnectionConfig) -> Self {
        let lease_config = LeaseConfig {
            enabled: config.honor_lease,
        };
        Self {
            state: Stream0State::Active,
            keepalive: KeepaliveTracker::new(KeepaliveConfig::new(
                Duration::from_millis(config.keepalive_period_ms as u64),
                config.missed_keepalive_threshold,
            )),
            lease_manager: Arc::new(Mutex::new(LeaseManager::new(lease_config))),
            config,
        }
    }

    /// For the acceptor side: the first inbound frame must be SETUP.
    pub fn new_awaiting_setup(config: ConnectionConfig) -> Self {
        let lease_config = LeaseConfig {
            enabled: config.honor_lease,
        };
        Self {
            state: Stream0State::AwaitingSetup,
            keepalive: KeepaliveTracker::new(KeepaliveConfig::new(
                Duration::from_millis(config.keepalive_period_ms as u64),
                config.missed_keepalive_threshold,
            )),
            lease_manager: Arc::new(Mutex::new(LeaseManager::new(lease_config))),
            config,
        }
    }

    /// A clone of the shared handle, for handing to the Requester at connection setup.
    pub fn lease_manager_handle(&self) -> Arc<Mutex<LeaseManager>> {
        self.lease_manager.clone()
    }

    pub fn state(&self) -> Stream0State {
        self.state
    }

    /// Validates an inbound SETUP and transitions to ACTIVE, or returns the ERROR frame
    /// to send back and closes.
    pub fn accept_setup(&mut self, setup: &SetupFrame) -> Result<()> {
        if self.state != Stream0State::AwaitingSetup {
            return Err(RSocketError::InvalidSetup(
                "SETUP received outside AWAITING_SETUP".into(),
            ));
        }
        if setup.major_version != 1 {
            self.state = Stream0State::Closed;
            return Err(RSocketError::InvalidSetup(format!(
                "unsupported major version {}",
                setup.major_version
            )));
        }
        debug!(stream_id = 0, "SETUP accepted, connection now ACTIVE");
        self.state = Stream0State::Active;
        Ok(())
    }

    /// Any non-SETUP frame arriving before SETUP is a fatal protocol error.
    pub fn reject_premature_frame(&mut self) -> RSocketError {
        self.state = Stream0State::Closed;
        RSocketError::InvalidSetup("first frame on an accepted connection was not SETUP".into())
    }

    /// Handles an inbound KEEPALIVE: if RESPOND is set, the caller must echo a non-RESPOND
    /// KEEPALIVE with the same data (this only updates bookkeeping and tells the caller
    /// whether to echo).
    pub fn on_keepalive_received(&mut self, frame: &KeepaliveFrame) -> bool {
        if frame.respond {
            warn!(stream_id = 0, "keepalive requires echo");
            true
        } else {
            self.keepalive.on_ack_received();
            false
        }
    }

    pub fn on_keepalive_sent(&mut self) {
        self.keepalive.on_ping_sent();
    }

    pub fn should_send_keepalive(&self) -> bool {
        self.keepalive.should_ping()
    }

    /// True once the missed-ack threshold has tripped; the driver must close fatally.
    pub fn keepalive_timed_out(&self) -> bool {
        self.keepalive.is_dead()
    }

    pub fn on_lease_received(&mut self, frame: &LeaseFrame) {
        self.lease_manager.lock().unwrap().receive_lease(frame);
    }

    /// ERROR on stream 0 is always connection-fatal.
    pub fn on_connection_error(&mut self, frame: &ErrorFrame) -> RSocketError {
        self.state = Stream0State::Closed;
        error!(stream_id = 0, code = frame.code, "fatal connection error from peer");
        RSocketError::from_wire(frame.code, frame.message.clone())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn make_setup_frame(&self, resume_token: Option<bytes::Bytes>, metadata: Option<bytes::Bytes>, data: bytes::Bytes) -> SetupFrame {
        SetupFrame {
            stream_id: 0,
            major_version: 1,
            minor_version: 0,
            keepalive_interval_ms: self.config.keepalive_period_ms,
            max_lifetime_ms: self.config.max_lifetime_ms,
            resume_token,
            honor_lease: self.config.honor_lease,
            metadata_mime_type: self.config.metadata_mime_type.clone(),
            data_mime_type: self.config.data_mime_type.clone(),
            metadata,
            data,
        }
    }

    pub fn make_keepalive_echo(&self, frame: &KeepaliveFrame) -> Frame {
        Frame::Keepalive(KeepaliveFrame {
            respond: false,
            last_received_position: frame.last_received_position,
            data: frame.data.clone(),
        })
    }

    pub fn close(&mut self) {
        self.state = Stream0State::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use bytes::Bytes;

    fn sample_setup() -> SetupFrame {
        SetupFrame {
            stream_id: 0,
            major_version: 1,
            minor_version: 0,
            keepalive_interval_ms: 30_000,
            max_lifetime_ms: 120_000,
            resume_token: None,
            honor_lease: false,
            metadata_mime_type: "application/binary".into(),
            data_mime_type: "application/binary".into(),
            metadata: None,
            data: Bytes::new(),
        }
    }

    #[test]
    fn acceptor_transitions_to_active_on_valid_setup() {
        let mut handler = Stream0Handler::new_awaiting_setup(ConnectionConfig::default());
        assert_eq!(handler.state(), Stream0State::AwaitingSetup);
        handler.accept_setup(&sample_setup()).unwrap();
        assert_eq!(handler.state(), Stream0State::Active);
    }

    #[test]
    fn rejects_unsupported_major_version() {
        let mut handler = Stream0Handler::new_awaiting_setup(ConnectionConfig::default());
        let mut setup = sample_setup();
        setup.major_version = 9;
        let err = handler.accept_setup(&setup).unwrap_err();
        assert!(matches!(err, RSocketError::InvalidSetup(_)));
        assert_eq!(handler.state(), Stream0State::Closed);
    }

    #[test]
    fn premature_frame_before_setup_is_fatal() {
        let mut handler = Stream0Handler::new_awaiting_setup(ConnectionConfig::default());
        let err = handler.reject_premature_frame();
        assert!(matches!(err, RSocketError::InvalidSetup(_)));
        assert_eq!(handler.state(), Stream0State::Closed);
    }

    #[test]
    fn inbound_respond_keepalive_requires_echo() {
        let mut handler = Stream0Handler::new_active(ConnectionConfig::default());
        let needs_echo = handler.on_keepalive_received(&KeepaliveFrame {
            respond: true,
            last_received_position: 0,
            data: Bytes::new(),
        });
        assert!(needs_echo);
    }

    #[test]
    fn connection_error_on_stream_zero_closes() {
        let mut handler = Stream0Handler::new_active(ConnectionConfig::default());
        let err = handler.on_connection_error(&ErrorFrame {
            stream_id: 0,
            code: ErrorCode::ConnectionError.as_wire(),
            message: "boom".into(),
        });
        assert!(matches!(err, RSocketError::ConnectionError(_)));
        assert_eq!(handler.state(), Stream0State::Closed);
    }
}
