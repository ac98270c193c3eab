// ABOUTME: KEEPALIVE (0x03) — periodic liveness heartbeat with echo-response semantics
// ABOUTME: RESPOND=1 asks the peer to echo back RESPOND=0 with the same payload

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

use super::codec::{get_data, require_remaining, Decodable, Encodable, FrameCodecError};
use super::header::{FrameHeader, FrameType, Flags};
use super::FrameBody;

#[derive(Clone, Debug, PartialEq)]
pub struct KeepaliveFrame {
    pub respond: bool,
    pub last_received_position: u64,
    pub data: Bytes,
}

impl Encodable for KeepaliveFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        buf.put_u64(self.last_received_position);
        buf.put_slice(&self.data);
        Ok(())
    }
}

impl Decodable for KeepaliveFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        require_remaining(buf, 8)?;
        let last_received_position = buf.get_u64();
        let data = get_data(buf);
        Ok(KeepaliveFrame {
            respond: header.flags.contains(Flags::RESPOND),
            last_received_position,
            data,
        })
    }
}

impl FrameBody for KeepaliveFrame {
    fn stream_id(&self) -> u32 {
        0
    }

    fn frame_type(&self) -> FrameType {
        FrameType::Keepalive
    }

    fn flags(&self) -> Flags {
        if self.respond {
            Flags::RESPOND
        } else {
            Flags::empty()
        }
    }
}
