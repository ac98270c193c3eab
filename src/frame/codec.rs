// ABOUTME: Encodable/Decodable traits shared by every frame body, plus wire-level helpers
// ABOUTME: for the 24-bit metadata length prefix and the 31-bit stream-id/request-n fields

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error;

use super::header::FrameHeader;

/// Maximum size of a single RSocket frame this codec will decode, guarding against a
/// corrupt or hostile length prefix causing unbounded allocation. Overridable via
/// [`crate::config::ConnectionConfig::max_inbound_payload_size`] at the connection layer;
/// this constant is the codec's own hard ceiling.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// The high bit of a 32-bit stream-id or request-n field is reserved and must be zero.
pub const RESERVED_BIT: u32 = 0x8000_0000;

/// Errors raised while decoding or encoding a single frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameCodecError {
    #[error("not enough bytes buffered to decode a full frame")]
    Incomplete,

    #[error("frame length {0} exceeds the maximum of {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("invalid request_n: {0} (must be nonzero with the reserved bit clear)")]
    InvalidRequestN(u32),

    #[error("unknown frame type: {0:#04x}")]
    UnknownFrameType(u8),

    #[error("stream id {0} has the reserved high bit set")]
    ReservedStreamIdBit(u32),

    #[error("fragmented frame (FOLLOWS set) is not supported at the core boundary")]
    Fragmented,

    #[error("invalid utf-8 in frame field '{field}'")]
    InvalidUtf8 { field: &'static str },
}

/// Implemented by every frame body type (the payload after the 6-byte common header).
pub trait Encodable {
    /// Encode the type-specific body into `buf`. The caller has already written the
    /// common header (stream id, type, flags); this only writes what follows it.
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError>;
}

/// Implemented by every frame body type for the decode direction.
pub trait Decodable: Sized {
    /// Decode the type-specific body from `buf`, given the already-parsed common header.
    fn decode_body(
        header: &FrameHeader,
        buf: &mut Cursor<&[u8]>,
    ) -> Result<Self, FrameCodecError>;
}

/// Read the 31-bit value (reserved high bit must be clear) used for stream ids and
/// `REQUEST_N` / `initial_request_n` fields.
pub fn get_u31(buf: &mut Cursor<&[u8]>) -> Result<u32, FrameCodecError> {
    require_remaining(buf, 4)?;
    let v = buf.get_u32();
    if v & RESERVED_BIT != 0 {
        return Err(FrameCodecError::ReservedStreamIdBit(v));
    }
    Ok(v)
}

pub fn require_remaining(buf: &Cursor<&[u8]>, n: usize) -> Result<(), FrameCodecError> {
    if buf.remaining() < n {
        Err(FrameCodecError::Incomplete)
    } else {
        Ok(())
    }
}

/// Read a 3-byte big-endian length followed by that many bytes of metadata.
pub fn get_metadata(buf: &mut Cursor<&[u8]>) -> Result<Bytes, FrameCodecError> {
    require_remaining(buf, 3)?;
    let len = ((buf.get_u8() as usize) << 16) | ((buf.get_u8() as usize) << 8) | buf.get_u8() as usize;
    require_remaining(buf, len)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    Ok(Bytes::from(out))
}

/// Write a 3-byte big-endian length prefix followed by the metadata bytes.
pub fn put_metadata(buf: &mut BytesMut, metadata: &Bytes) -> Result<(), FrameCodecError> {
    if metadata.len() > 0x00FF_FFFF {
        return Err(FrameCodecError::MalformedFrame(
            "metadata length exceeds 24-bit length prefix".into(),
        ));
    }
    let len = metadata.len() as u32;
    buf.put_u8(((len >> 16) & 0xFF) as u8);
    buf.put_u8(((len >> 8) & 0xFF) as u8);
    buf.put_u8((len & 0xFF) as u8);
    buf.put_slice(metadata);
    Ok(())
}

/// Read the rest of the cursor as the data section (whatever remains after metadata).
pub fn get_data(buf: &mut Cursor<&[u8]>) -> Bytes {
    let remaining = buf.remaining();
    let mut out = vec![0u8; remaining];
    buf.copy_to_slice(&mut out);
    Bytes::from(out)
}

pub fn get_u8_length_prefixed_string(
    buf: &mut Cursor<&[u8]>,
    field: &'static str,
) -> Result<String, FrameCodecError> {
    require_remaining(buf, 1)?;
    let len = buf.get_u8() as usize;
    require_remaining(buf, len)?;
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    String::from_utf8(out).map_err(|_| FrameCodecError::InvalidUtf8 { field })
}

pub fn put_u8_length_prefixed_string(buf: &mut BytesMut, s: &str) -> Result<(), FrameCodecError> {
    if s.len() > u8::MAX as usize {
        return Err(FrameCodecError::MalformedFrame(format!(
            "string field too long for u8 length prefix: {}",
            s.len()
        )));
    }
    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Peek the 3-byte big-endian frame length that precedes each frame on a TCP transport,
/// without consuming it. Returns `None` if fewer than 3 bytes are buffered.
pub fn peek_tcp_frame_length(buf: &[u8]) -> Option<usize> {
    if buf.len() < 3 {
        return None;
    }
    Some(((buf[0] as usize) << 16) | ((buf[1] as usize) << 8) | buf[2] as usize)
}

/// Write the 3-byte big-endian length prefix used to frame an RSocket frame over TCP.
pub fn put_tcp_frame_length(buf: &mut BytesMut, len: usize) -> Result<(), FrameCodecError> {
    if len > 0x00FF_FFFF {
        return Err(FrameCodecError::FrameTooLarge(len));
    }
    buf.put_u8(((len >> 16) & 0xFF) as u8);
    buf.put_u8(((len >> 8) & 0xFF) as u8);
    buf.put_u8((len & 0xFF) as u8);
    Ok(())
}

/// Map a codec error to the wire error code it should be reported with, per the
/// error handling design's protocol-fatal category.
impl FrameCodecError {
    pub fn is_unknown_frame_type(&self) -> bool {
        matches!(self, Self::UnknownFrameType(_))
    }
}
