// ABOUTME: Top-level error taxonomy surfaced to applications and to the connection driver
// ABOUTME: Maps wire error codes (ERROR frame) to typed Rust errors and back

use std::io;
use thiserror::Error;

/// Errors carried in an RSocket `ERROR` frame, per the wire protocol's error-code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    InvalidSetup = 0x0000_0001,
    UnsupportedSetup = 0x0000_0002,
    RejectedSetup = 0x0000_0003,
    RejectedResume = 0x0000_0004,
    ConnectionError = 0x0000_0101,
    ConnectionClose = 0x0000_0102,
    ApplicationError = 0x0000_0201,
    Rejected = 0x0000_0202,
    Canceled = 0x0000_0203,
    Invalid = 0x0000_0204,
}

impl ErrorCode {
    /// Decode a wire error code, mapping the `0x0000_0301..=0xFFFF_FFFE` custom range
    /// to `None` — callers that need the raw value should read it before calling this.
    pub fn from_wire(code: u32) -> Option<Self> {
        match code {
            0x0000_0001 => Some(Self::InvalidSetup),
            0x0000_0002 => Some(Self::UnsupportedSetup),
            0x0000_0003 => Some(Self::RejectedSetup),
            0x0000_0004 => Some(Self::RejectedResume),
            0x0000_0101 => Some(Self::ConnectionError),
            0x0000_0102 => Some(Self::ConnectionClose),
            0x0000_0201 => Some(Self::ApplicationError),
            0x0000_0202 => Some(Self::Rejected),
            0x0000_0203 => Some(Self::Canceled),
            0x0000_0204 => Some(Self::Invalid),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u32 {
        self as u32
    }
}

/// Errors observable by an application using the core, and by the connection driver itself.
///
/// Variants correspond one-to-one with the taxonomy in the error handling design: transport
/// fatal, protocol fatal, keepalive fatal, per-stream application error, and lease rejection.
#[derive(Debug, Error)]
pub enum RSocketError {
    /// The connection (transport or protocol) is gone; every outstanding stream receives this.
    #[error("closed channel")]
    ClosedChannel,

    /// A fatal protocol condition was detected locally, or reported by the peer on stream 0.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Peer's SETUP was unacceptable, or ours was rejected by the peer.
    #[error("invalid setup: {0}")]
    InvalidSetup(String),

    /// A handler raised an application-level error, or the peer reported one for our request.
    #[error("application error: {0}")]
    ApplicationError(String),

    /// A custom (non-standard) error code outside the reserved ranges was reported.
    #[error("custom error {code:#010x}: {message}")]
    Custom { code: u32, message: String },

    /// Transient rejection — retryable at the application layer (lease exhaustion, backpressure).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The stream was canceled (locally or by the peer).
    #[error("canceled")]
    Canceled,

    /// A malformed request was reported by the peer or detected locally.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Underlying transport I/O failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A frame could not be decoded from the wire.
    #[error("frame codec error: {0}")]
    Codec(#[from] crate::frame::codec::FrameCodecError),
}

impl RSocketError {
    /// Build the error that corresponds to an inbound ERROR frame's code and message.
    pub fn from_wire(code: u32, message: String) -> Self {
        match ErrorCode::from_wire(code) {
            Some(ErrorCode::InvalidSetup) | Some(ErrorCode::UnsupportedSetup) => {
                Self::InvalidSetup(message)
            }
            Some(ErrorCode::RejectedSetup) => Self::Rejected(message),
            Some(ErrorCode::RejectedResume) => Self::Rejected(message),
            Some(ErrorCode::ConnectionError) | Some(ErrorCode::ConnectionClose) => {
                Self::ConnectionError(message)
            }
            Some(ErrorCode::ApplicationError) => Self::ApplicationError(message),
            Some(ErrorCode::Rejected) => Self::Rejected(message),
            Some(ErrorCode::Canceled) => Self::Canceled,
            Some(ErrorCode::Invalid) => Self::Invalid(message),
            None => Self::Custom { code, message },
        }
    }

    /// The wire `(code, message)` pair to put in an outbound ERROR frame for this error.
    pub fn to_wire(&self) -> (u32, String) {
        match self {
            Self::ClosedChannel => (ErrorCode::ConnectionClose.as_wire(), self.to_string()),
            Self::ConnectionError(m) => (ErrorCode::ConnectionError.as_wire(), m.clone()),
            Self::InvalidSetup(m) => (ErrorCode::InvalidSetup.as_wire(), m.clone()),
            Self::ApplicationError(m) => (ErrorCode::ApplicationError.as_wire(), m.clone()),
            Self::Custom { code, message } => (*code, message.clone()),
            Self::Rejected(m) => (ErrorCode::Rejected.as_wire(), m.clone()),
            Self::Canceled => (ErrorCode::Canceled.as_wire(), self.to_string()),
            Self::Invalid(m) => (ErrorCode::Invalid.as_wire(), m.clone()),
            Self::Transport(e) => (ErrorCode::ConnectionError.as_wire(), e.to_string()),
            Self::Codec(e) => (ErrorCode::ConnectionError.as_wire(), e.to_string()),
        }
    }

    /// Whether this error is an expected part of orderly shutdown and should not be
    /// reported a second time through the `error_consumer` callback.
    pub fn is_expected_on_shutdown(&self) -> bool {
        matches!(self, Self::ClosedChannel | Self::Canceled)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RSocketError>;
