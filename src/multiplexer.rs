// ABOUTME: Routes inbound frames by stream-id parity into stream-0, responder, requester
// ABOUTME: Parity convention: the side that sent SETUP uses odd ids, the other uses even

use crate::frame::Frame;
use crate::stream_id::Parity;

/// Where an inbound frame belongs, decided purely from its stream id and this side's own
/// issuing parity (the opposite parity is the peer-initiated, i.e. responder-bound, side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    StreamZero,
    /// The peer opened this stream; it is ours to respond to.
    ResponderInbound,
    /// We opened this stream; this frame is a reply to our own request.
    RequesterInbound,
}

/// Classifies an inbound frame given the local side's own issuing parity.
pub struct Multiplexer {
    local_parity: Parity,
}

impl Multiplexer {
    pub fn new(local_parity: Parity) -> Self {
        Self { local_parity }
    }

    pub fn route(&self, frame: &Frame) -> Route {
        let id = frame.stream_id();
        if id == 0 {
            return Route::StreamZero;
        }
        if self.local_parity.matches_id(id) {
            Route::RequesterInbound
        } else {
            Route::ResponderInbound
        }
    }
}
