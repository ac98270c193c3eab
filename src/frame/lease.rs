// ABOUTME: LEASE (0x02) — grants the peer permission to initiate up to N new streams
// ABOUTME: within a TTL window; consumed by the Lease Manager

use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;

use super::codec::{get_data, get_metadata, put_metadata, require_remaining, Decodable, Encodable, FrameCodecError};
use super::header::{FrameHeader, FrameType, Flags};
use super::FrameBody;

#[derive(Clone, Debug, PartialEq)]
pub struct LeaseFrame {
    pub ttl_ms: u32,
    pub allowed_requests: u32,
    pub metadata: Option<Bytes>,
}

impl Encodable for LeaseFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        buf.put_u32(self.ttl_ms);
        buf.put_u32(self.allowed_requests);
        if let Some(metadata) = &self.metadata {
            put_metadata(buf, metadata)?;
        }
        Ok(())
    }
}

impl Decodable for LeaseFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        use bytes::Buf;
        require_remaining(buf, 8)?;
        let ttl_ms = buf.get_u32();
        let allowed_requests = buf.get_u32();
        let metadata = if header.has_metadata() {
            Some(get_metadata(buf)?)
        } else {
            None
        };
        // LEASE has no data section; any trailing bytes (there should be none once
        // metadata, if present, has been consumed) are discarded for forward tolerance.
        let _ = get_data(buf);
        Ok(LeaseFrame {
            ttl_ms,
            allowed_requests,
            metadata,
        })
    }
}

impl FrameBody for LeaseFrame {
    fn stream_id(&self) -> u32 {
        0
    }

    fn frame_type(&self) -> FrameType {
        FrameType::Lease
    }

    fn flags(&self) -> Flags {
        if self.metadata.is_some() {
            Flags::METADATA
        } else {
            Flags::empty()
        }
    }
}
