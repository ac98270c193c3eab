// ABOUTME: RESUME (0x0D) / RESUME_OK (0x0E) — parsed and encoded for wire compatibility
// ABOUTME: only; no resumption state machine is implemented (see Non-goals)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

use super::codec::{require_remaining, Decodable, Encodable, FrameCodecError};
use super::header::{FrameHeader, FrameType, Flags};
use super::FrameBody;

#[derive(Clone, Debug, PartialEq)]
pub struct ResumeFrame {
    pub major_version: u16,
    pub minor_version: u16,
    pub resume_token: Bytes,
    pub last_received_server_position: u64,
    pub first_available_client_position: u64,
}

impl Encodable for ResumeFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        buf.put_u16(self.major_version);
        buf.put_u16(self.minor_version);
        if self.resume_token.len() > u16::MAX as usize {
            return Err(FrameCodecError::MalformedFrame(
                "resume token too long for u16 length prefix".into(),
            ));
        }
        buf.put_u16(self.resume_token.len() as u16);
        buf.put_slice(&self.resume_token);
        buf.put_u64(self.last_received_server_position);
        buf.put_u64(self.first_available_client_position);
        Ok(())
    }
}

impl Decodable for ResumeFrame {
    fn decode_body(_header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        require_remaining(buf, 4)?;
        let major_version = buf.get_u16();
        let minor_version = buf.get_u16();
        require_remaining(buf, 2)?;
        let token_len = buf.get_u16() as usize;
        require_remaining(buf, token_len)?;
        let mut token = vec![0u8; token_len];
        buf.copy_to_slice(&mut token);
        require_remaining(buf, 16)?;
        let last_received_server_position = buf.get_u64();
        let first_available_client_position = buf.get_u64();
        Ok(ResumeFrame {
            major_version,
            minor_version,
            resume_token: Bytes::from(token),
            last_received_server_position,
            first_available_client_position,
        })
    }
}

impl FrameBody for ResumeFrame {
    fn stream_id(&self) -> u32 {
        0
    }
    fn frame_type(&self) -> FrameType {
        FrameType::Resume
    }
    fn flags(&self) -> Flags {
        Flags::empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResumeOkFrame {
    pub last_received_client_position: u64,
}

impl Encodable for ResumeOkFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        buf.put_u64(self.last_received_client_position);
        Ok(())
    }
}

impl Decodable for ResumeOkFrame {
    fn decode_body(_header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        require_remaining(buf, 8)?;
        Ok(ResumeOkFrame {
            last_received_client_position: buf.get_u64(),
        })
    }
}

impl FrameBody for ResumeOkFrame {
    fn stream_id(&self) -> u32 {
        0
    }
    fn frame_type(&self) -> FrameType {
        FrameType::ResumeOk
    }
    fn flags(&self) -> Flags {
        Flags::empty()
    }
}
