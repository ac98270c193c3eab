// ABOUTME: The stream-initiating and flow-control frames: REQUEST_RESPONSE, REQUEST_FNF,
// ABOUTME: REQUEST_STREAM, REQUEST_CHANNEL, REQUEST_N, and CANCEL

use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;

use super::codec::{
    get_data, get_metadata, get_u31, put_metadata, require_remaining, Decodable, Encodable,
    FrameCodecError,
};
use super::header::{FrameHeader, FrameType, Flags};
use super::FrameBody;

/// Shared body for REQUEST_RESPONSE and REQUEST_FNF: both are "metadata + data, no
/// initial credit" request frames.
#[derive(Clone, Debug, PartialEq)]
pub struct SimpleRequestFrame {
    pub stream_id: u32,
    pub metadata: Option<Bytes>,
    pub data: Bytes,
}

fn decode_simple_request(
    header: &FrameHeader,
    buf: &mut Cursor<&[u8]>,
) -> Result<SimpleRequestFrame, FrameCodecError> {
    if header.flags.contains(Flags::FOLLOWS) {
        return Err(FrameCodecError::Fragmented);
    }
    let metadata = if header.has_metadata() {
        Some(get_metadata(buf)?)
    } else {
        None
    };
    let data = get_data(buf);
    Ok(SimpleRequestFrame {
        stream_id: header.stream_id,
        metadata,
        data,
    })
}

fn encode_simple_request(frame: &SimpleRequestFrame, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
    if let Some(metadata) = &frame.metadata {
        put_metadata(buf, metadata)?;
    }
    buf.put_slice(&frame.data);
    Ok(())
}

fn simple_request_flags(frame: &SimpleRequestFrame) -> Flags {
    if frame.metadata.is_some() {
        Flags::METADATA
    } else {
        Flags::empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestResponseFrame(pub SimpleRequestFrame);

impl Encodable for RequestResponseFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        encode_simple_request(&self.0, buf)
    }
}

impl Decodable for RequestResponseFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        Ok(Self(decode_simple_request(header, buf)?))
    }
}

impl FrameBody for RequestResponseFrame {
    fn stream_id(&self) -> u32 {
        self.0.stream_id
    }
    fn frame_type(&self) -> FrameType {
        FrameType::RequestResponse
    }
    fn flags(&self) -> Flags {
        simple_request_flags(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestFnfFrame(pub SimpleRequestFrame);

impl Encodable for RequestFnfFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        encode_simple_request(&self.0, buf)
    }
}

impl Decodable for RequestFnfFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        Ok(Self(decode_simple_request(header, buf)?))
    }
}

impl FrameBody for RequestFnfFrame {
    fn stream_id(&self) -> u32 {
        self.0.stream_id
    }
    fn frame_type(&self) -> FrameType {
        FrameType::RequestFnf
    }
    fn flags(&self) -> Flags {
        simple_request_flags(&self.0)
    }
}

/// Shared body for REQUEST_STREAM and REQUEST_CHANNEL: both carry an initial credit.
#[derive(Clone, Debug, PartialEq)]
pub struct CreditedRequestFrame {
    pub stream_id: u32,
    pub initial_request_n: u32,
    pub metadata: Option<Bytes>,
    pub data: Bytes,
    /// REQUEST_CHANNEL only: the initiator's upstream completes with just this element.
    pub complete: bool,
}

fn decode_credited_request(
    header: &FrameHeader,
    buf: &mut Cursor<&[u8]>,
) -> Result<CreditedRequestFrame, FrameCodecError> {
    if header.flags.contains(Flags::FOLLOWS) {
        return Err(FrameCodecError::Fragmented);
    }
    let initial_request_n = get_u31(buf)?;
    if initial_request_n == 0 {
        return Err(FrameCodecError::InvalidRequestN(0));
    }
    let metadata = if header.has_metadata() {
        Some(get_metadata(buf)?)
    } else {
        None
    };
    let data = get_data(buf);
    Ok(CreditedRequestFrame {
        stream_id: header.stream_id,
        initial_request_n,
        metadata,
        data,
        complete: header.flags.contains(Flags::COMPLETE),
    })
}

fn encode_credited_request(
    frame: &CreditedRequestFrame,
    buf: &mut BytesMut,
) -> Result<(), FrameCodecError> {
    if frame.initial_request_n == 0 {
        return Err(FrameCodecError::InvalidRequestN(0));
    }
    buf.put_u32(frame.initial_request_n);
    if let Some(metadata) = &frame.metadata {
        put_metadata(buf, metadata)?;
    }
    buf.put_slice(&frame.data);
    Ok(())
}

fn credited_request_flags(frame: &CreditedRequestFrame) -> Flags {
    let mut flags = Flags::empty();
    if frame.metadata.is_some() {
        flags |= Flags::METADATA;
    }
    if frame.complete {
        flags |= Flags::COMPLETE;
    }
    flags
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestStreamFrame(pub CreditedRequestFrame);

impl Encodable for RequestStreamFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        encode_credited_request(&self.0, buf)
    }
}

impl Decodable for RequestStreamFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        Ok(Self(decode_credited_request(header, buf)?))
    }
}

impl FrameBody for RequestStreamFrame {
    fn stream_id(&self) -> u32 {
        self.0.stream_id
    }
    fn frame_type(&self) -> FrameType {
        FrameType::RequestStream
    }
    fn flags(&self) -> Flags {
        credited_request_flags(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestChannelFrame(pub CreditedRequestFrame);

impl Encodable for RequestChannelFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        encode_credited_request(&self.0, buf)
    }
}

impl Decodable for RequestChannelFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        Ok(Self(decode_credited_request(header, buf)?))
    }
}

impl FrameBody for RequestChannelFrame {
    fn stream_id(&self) -> u32 {
        self.0.stream_id
    }
    fn frame_type(&self) -> FrameType {
        FrameType::RequestChannel
    }
    fn flags(&self) -> Flags {
        credited_request_flags(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestNFrame {
    pub stream_id: u32,
    pub request_n: u32,
}

impl Encodable for RequestNFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        if self.request_n == 0 {
            return Err(FrameCodecError::InvalidRequestN(0));
        }
        buf.put_u32(self.request_n);
        Ok(())
    }
}

impl Decodable for RequestNFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        let request_n = get_u31(buf)?;
        if request_n == 0 {
            return Err(FrameCodecError::InvalidRequestN(0));
        }
        Ok(RequestNFrame {
            stream_id: header.stream_id,
            request_n,
        })
    }
}

impl FrameBody for RequestNFrame {
    fn stream_id(&self) -> u32 {
        self.stream_id
    }
    fn frame_type(&self) -> FrameType {
        FrameType::RequestN
    }
    fn flags(&self) -> Flags {
        Flags::empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CancelFrame {
    pub stream_id: u32,
}

impl Encodable for CancelFrame {
    fn encode_body(&self, _buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        Ok(())
    }
}

impl Decodable for CancelFrame {
    fn decode_body(header: &FrameHeader, _buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        Ok(CancelFrame {
            stream_id: header.stream_id,
        })
    }
}

impl FrameBody for CancelFrame {
    fn stream_id(&self) -> u32 {
        self.stream_id
    }
    fn frame_type(&self) -> FrameType {
        FrameType::Cancel
    }
    fn flags(&self) -> Flags {
        Flags::empty()
    }
}
