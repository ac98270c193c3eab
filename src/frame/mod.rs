//! The wire format: a `Frame` value per RSocket frame type, and the codec that moves
//! between `Frame` values and bytes. See [`codec`] for the shared encode/decode plumbing
//! and [`header`] for the common 6-byte header every frame type shares.

pub mod codec;
pub mod error_frame;
pub mod ext;
pub mod header;
pub mod keepalive;
pub mod lease;
pub mod metadata_push;
pub mod payload_frame;
pub mod request;
pub mod resume;
pub mod setup;

use bytes::{Bytes, BytesMut};
use std::io::Cursor;

pub use codec::{Decodable, Encodable, FrameCodecError};
pub use error_frame::ErrorFrame;
pub use ext::ExtFrame;
pub use header::{FrameHeader, FrameType, Flags};
pub use keepalive::KeepaliveFrame;
pub use lease::LeaseFrame;
pub use metadata_push::MetadataPushFrame;
pub use payload_frame::PayloadFrame;
pub use request::{
    CancelFrame, CreditedRequestFrame, RequestChannelFrame, RequestFnfFrame, RequestNFrame,
    RequestResponseFrame, RequestStreamFrame, SimpleRequestFrame,
};
pub use resume::{ResumeFrame, ResumeOkFrame};
pub use setup::SetupFrame;

/// Every frame body knows its own stream id, frame type, and the flags it needs set.
/// Implemented by each per-type struct; used by [`Frame::encode`] to assemble the
/// common header without duplicating that bookkeeping per variant.
pub trait FrameBody {
    fn stream_id(&self) -> u32;
    fn frame_type(&self) -> FrameType;
    fn flags(&self) -> Flags;
}

/// A decoded RSocket frame of any type. One variant per entry in the wire protocol's
/// frame type table.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Setup(SetupFrame),
    Lease(LeaseFrame),
    Keepalive(KeepaliveFrame),
    RequestResponse(RequestResponseFrame),
    RequestFnf(RequestFnfFrame),
    RequestStream(RequestStreamFrame),
    RequestChannel(RequestChannelFrame),
    RequestN(RequestNFrame),
    Cancel(CancelFrame),
    Payload(PayloadFrame),
    Error(ErrorFrame),
    MetadataPush(MetadataPushFrame),
    Resume(ResumeFrame),
    ResumeOk(ResumeOkFrame),
    Ext(ExtFrame),
}

macro_rules! for_each_variant {
    ($self:expr, $name:ident => $body:expr) => {
        match $self {
            Frame::Setup($name) => $body,
            Frame::Lease($name) => $body,
            Frame::Keepalive($name) => $body,
            Frame::RequestResponse($name) => $body,
            Frame::RequestFnf($name) => $body,
            Frame::RequestStream($name) => $body,
            Frame::RequestChannel($name) => $body,
            Frame::RequestN($name) => $body,
            Frame::Cancel($name) => $body,
            Frame::Payload($name) => $body,
            Frame::Error($name) => $body,
            Frame::MetadataPush($name) => $body,
            Frame::Resume($name) => $body,
            Frame::ResumeOk($name) => $body,
            Frame::Ext($name) => $body,
        }
    };
}

impl Frame {
    pub fn stream_id(&self) -> u32 {
        for_each_variant!(self, f => f.stream_id())
    }

    pub fn frame_type(&self) -> FrameType {
        for_each_variant!(self, f => f.frame_type())
    }

    pub fn flags(&self) -> Flags {
        for_each_variant!(self, f => f.flags())
    }

    /// True for the frame types the Duplex Connection Adapter gives transmission
    /// priority to (they may overtake buffered, not-yet-sent data frames).
    pub fn is_control_priority(&self) -> bool {
        matches!(
            self,
            Frame::Keepalive(_) | Frame::Lease(_) | Frame::Error(_) | Frame::Cancel(_)
        )
    }

    pub fn encode(&self) -> Result<Bytes, FrameCodecError> {
        let mut buf = BytesMut::with_capacity(64);
        let header = FrameHeader::new(self.stream_id(), self.frame_type(), self.flags());
        header.encode(&mut buf)?;
        for_each_variant!(self, f => f.encode_body(&mut buf))?;
        Ok(buf.freeze())
    }

    pub fn decode(src: &[u8]) -> Result<Frame, FrameCodecError> {
        let mut cursor = Cursor::new(src);
        let header = FrameHeader::decode(&mut cursor)?;
        let frame = match header.frame_type {
            FrameType::Setup => Frame::Setup(SetupFrame::decode_body(&header, &mut cursor)?),
            FrameType::Lease => Frame::Lease(LeaseFrame::decode_body(&header, &mut cursor)?),
            FrameType::Keepalive => {
                Frame::Keepalive(KeepaliveFrame::decode_body(&header, &mut cursor)?)
            }
            FrameType::RequestResponse => {
                Frame::RequestResponse(RequestResponseFrame::decode_body(&header, &mut cursor)?)
            }
            FrameType::RequestFnf => {
                Frame::RequestFnf(RequestFnfFrame::decode_body(&header, &mut cursor)?)
            }
            FrameType::RequestStream => {
                Frame::RequestStream(RequestStreamFrame::decode_body(&header, &mut cursor)?)
            }
            FrameType::RequestChannel => {
                Frame::RequestChannel(RequestChannelFrame::decode_body(&header, &mut cursor)?)
            }
            FrameType::RequestN => Frame::RequestN(RequestNFrame::decode_body(&header, &mut cursor)?),
            FrameType::Cancel => Frame::Cancel(CancelFrame::decode_body(&header, &mut cursor)?),
            FrameType::Payload => Frame::Payload(PayloadFrame::decode_body(&header, &mut cursor)?),
            FrameType::Error => Frame::Error(ErrorFrame::decode_body(&header, &mut cursor)?),
            FrameType::MetadataPush => {
                Frame::MetadataPush(MetadataPushFrame::decode_body(&header, &mut cursor)?)
            }
            FrameType::Resume => Frame::Resume(ResumeFrame::decode_body(&header, &mut cursor)?),
            FrameType::ResumeOk => Frame::ResumeOk(ResumeOkFrame::decode_body(&header, &mut cursor)?),
            FrameType::Ext => Frame::Ext(ExtFrame::decode_body(&header, &mut cursor)?),
        };
        Ok(frame)
    }

    pub fn error(stream_id: u32, error: &crate::error::RSocketError) -> Frame {
        Frame::Error(ErrorFrame::from_error(stream_id, error))
    }

    pub fn cancel(stream_id: u32) -> Frame {
        Frame::Cancel(CancelFrame { stream_id })
    }

    pub fn request_n(stream_id: u32, n: u32) -> Frame {
        Frame::RequestN(RequestNFrame {
            stream_id,
            request_n: n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    fn roundtrip(frame: Frame) {
        let encoded = frame.encode().expect("encode");
        let decoded = Frame::decode(&encoded).expect("decode");
        assert_eq!(frame, decoded, "round-trip mismatch for {:?}", frame.frame_type());
    }

    #[test]
    fn setup_roundtrips_with_and_without_resume_and_lease() {
        roundtrip(Frame::Setup(SetupFrame {
            stream_id: 0,
            major_version: 1,
            minor_version: 0,
            keepalive_interval_ms: 30_000,
            max_lifetime_ms: 120_000,
            resume_token: None,
            honor_lease: false,
            metadata_mime_type: "application/json".into(),
            data_mime_type: "application/binary".into(),
            metadata: None,
            data: Bytes::new(),
        }));

        roundtrip(Frame::Setup(SetupFrame {
            stream_id: 0,
            major_version: 1,
            minor_version: 0,
            keepalive_interval_ms: 30_000,
            max_lifetime_ms: 120_000,
            resume_token: Some(Bytes::from_static(b"tok")),
            honor_lease: true,
            metadata_mime_type: "application/json".into(),
            data_mime_type: "application/binary".into(),
            metadata: Some(Bytes::from_static(b"meta")),
            data: Bytes::from_static(b"hello"),
        }));
    }

    #[test]
    fn payload_roundtrips_next_complete_and_both() {
        roundtrip(Frame::Payload(PayloadFrame::next(1, Payload::new("hello world"))));
        roundtrip(Frame::Payload(PayloadFrame::complete(1)));
        roundtrip(Frame::Payload(PayloadFrame::next_complete(1, Payload::new("x"))));
    }

    #[test]
    fn empty_payload_roundtrips_with_no_metadata_flag() {
        let frame = Frame::Payload(PayloadFrame::next(7, Payload::new(Bytes::new())));
        let encoded = frame.encode().unwrap();
        let decoded = Frame::decode(&encoded).unwrap();
        match decoded {
            Frame::Payload(p) => {
                assert!(p.data.is_empty());
                assert!(p.metadata.is_none());
            }
            _ => panic!("expected payload"),
        }
    }

    #[test]
    fn distinguishes_absent_from_empty_metadata() {
        let absent = Frame::Payload(PayloadFrame::next(1, Payload::new("d")));
        let empty = Frame::Payload(PayloadFrame::next(1, Payload::with_metadata("d", Bytes::new())));
        assert_ne!(absent.encode().unwrap(), empty.encode().unwrap());

        match Frame::decode(&empty.encode().unwrap()).unwrap() {
            Frame::Payload(p) => assert_eq!(p.metadata, Some(Bytes::new())),
            _ => panic!(),
        }
        match Frame::decode(&absent.encode().unwrap()).unwrap() {
            Frame::Payload(p) => assert_eq!(p.metadata, None),
            _ => panic!(),
        }
    }

    #[test]
    fn payload_with_neither_next_nor_complete_is_malformed() {
        let mut buf = BytesMut::new();
        FrameHeader::new(1, FrameType::Payload, Flags::empty())
            .encode(&mut buf)
            .unwrap();
        let err = Frame::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameCodecError::MalformedFrame(_)));
    }

    #[test]
    fn request_n_rejects_zero() {
        let mut buf = BytesMut::new();
        FrameHeader::new(1, FrameType::RequestN, Flags::empty())
            .encode(&mut buf)
            .unwrap();
        buf.extend_from_slice(&0u32.to_be_bytes());
        let err = Frame::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameCodecError::InvalidRequestN(0)));
    }

    #[test]
    fn request_n_rejects_reserved_bit_set() {
        let mut buf = BytesMut::new();
        FrameHeader::new(1, FrameType::RequestN, Flags::empty())
            .encode(&mut buf)
            .unwrap();
        buf.extend_from_slice(&codec::RESERVED_BIT.to_be_bytes());
        let err = Frame::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameCodecError::ReservedStreamIdBit(_)));
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&1u32.to_be_bytes());
        // type code 0x00 is reserved/unused
        buf.extend_from_slice(&0u16.to_be_bytes());
        let err = Frame::decode(&buf).unwrap_err();
        assert!(err.is_unknown_frame_type());
    }

    #[test]
    fn follows_flag_is_rejected_as_fragmented() {
        let mut buf = BytesMut::new();
        FrameHeader::new(1, FrameType::RequestResponse, Flags::FOLLOWS)
            .encode(&mut buf)
            .unwrap();
        let err = Frame::decode(&buf).unwrap_err();
        assert!(matches!(err, FrameCodecError::Fragmented));
    }

    #[test]
    fn request_stream_and_channel_roundtrip() {
        roundtrip(Frame::RequestStream(RequestStreamFrame(CreditedRequestFrame {
            stream_id: 1,
            initial_request_n: 100,
            metadata: None,
            data: Bytes::from_static(b"hello"),
            complete: false,
        })));
        roundtrip(Frame::RequestChannel(RequestChannelFrame(CreditedRequestFrame {
            stream_id: 1,
            initial_request_n: u32::MAX & !codec::RESERVED_BIT,
            metadata: Some(Bytes::from_static(b"m")),
            data: Bytes::from_static(b"1"),
            complete: true,
        })));
    }

    #[test]
    fn error_and_lease_and_keepalive_roundtrip() {
        roundtrip(Frame::Error(ErrorFrame {
            stream_id: 0,
            code: 0x0000_0101,
            message: "keepalive timeout".into(),
        }));
        roundtrip(Frame::Lease(LeaseFrame {
            ttl_ms: 10_000,
            allowed_requests: 5,
            metadata: None,
        }));
        roundtrip(Frame::Keepalive(KeepaliveFrame {
            respond: true,
            last_received_position: 42,
            data: Bytes::from_static(b"ping"),
        }));
    }

    #[test]
    fn metadata_push_roundtrips() {
        roundtrip(Frame::MetadataPush(MetadataPushFrame {
            metadata: Bytes::from_static(b"connection-level metadata"),
        }));
    }

    #[test]
    fn resume_and_resume_ok_roundtrip() {
        roundtrip(Frame::Resume(ResumeFrame {
            major_version: 1,
            minor_version: 0,
            resume_token: Bytes::from_static(b"tok"),
            last_received_server_position: 1,
            first_available_client_position: 2,
        }));
        roundtrip(Frame::ResumeOk(ResumeOkFrame {
            last_received_client_position: 9,
        }));
    }

    #[test]
    fn cancel_roundtrips() {
        roundtrip(Frame::Cancel(CancelFrame { stream_id: 3 }));
    }
}
