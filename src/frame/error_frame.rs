// ABOUTME: ERROR (0x0B) — fatal (stream 0) or per-stream error report; code then UTF-8 message

use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;

use super::codec::{get_data, require_remaining, Decodable, Encodable, FrameCodecError};
use super::header::{FrameHeader, FrameType, Flags};
use super::FrameBody;

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorFrame {
    pub stream_id: u32,
    pub code: u32,
    pub message: String,
}

impl ErrorFrame {
    pub fn from_error(stream_id: u32, error: &crate::error::RSocketError) -> Self {
        let (code, message) = error.to_wire();
        Self {
            stream_id,
            code,
            message,
        }
    }
}

impl Encodable for ErrorFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        buf.put_u32(self.code);
        buf.put_slice(self.message.as_bytes());
        Ok(())
    }
}

impl Decodable for ErrorFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        require_remaining(buf, 4)?;
        let code = buf.get_u32();
        let data = get_data(buf);
        let message = String::from_utf8(data.to_vec())
            .map_err(|_| FrameCodecError::InvalidUtf8 { field: "error_message" })?;
        Ok(ErrorFrame {
            stream_id: header.stream_id,
            code,
            message,
        })
    }
}

impl FrameBody for ErrorFrame {
    fn stream_id(&self) -> u32 {
        self.stream_id
    }
    fn frame_type(&self) -> FrameType {
        FrameType::Error
    }
    fn flags(&self) -> Flags {
        Flags::empty()
    }
}
