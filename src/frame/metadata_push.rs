// ABOUTME: METADATA_PUSH (0x0C) — connection-level, metadata-only frame on stream 0
// ABOUTME: Metadata occupies the entire frame body; no inner length prefix is needed

use bytes::{Bytes, BytesMut};
use std::io::Cursor;

use super::codec::{get_data, Decodable, Encodable, FrameCodecError};
use super::header::{FrameHeader, FrameType, Flags};
use super::FrameBody;

#[derive(Clone, Debug, PartialEq)]
pub struct MetadataPushFrame {
    pub metadata: Bytes,
}

impl Encodable for MetadataPushFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        buf.extend_from_slice(&self.metadata);
        Ok(())
    }
}

impl Decodable for MetadataPushFrame {
    fn decode_body(_header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        Ok(MetadataPushFrame {
            metadata: get_data(buf),
        })
    }
}

impl FrameBody for MetadataPushFrame {
    fn stream_id(&self) -> u32 {
        0
    }
    fn frame_type(&self) -> FrameType {
        FrameType::MetadataPush
    }
    fn flags(&self) -> Flags {
        Flags::METADATA
    }
}
