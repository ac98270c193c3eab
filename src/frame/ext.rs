// ABOUTME: EXT (0x3F) — extended/custom frame type, carrying a vendor-defined extended
// ABOUTME: command id; decoded into an opaque variant so extensions never trip UNKNOWN_FRAME_TYPE

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

use super::codec::{get_data, get_metadata, put_metadata, require_remaining, Decodable, Encodable, FrameCodecError};
use super::header::{FrameHeader, FrameType, Flags};
use super::FrameBody;

#[derive(Clone, Debug, PartialEq)]
pub struct ExtFrame {
    pub stream_id: u32,
    pub extended_type: u32,
    pub ignore: bool,
    pub metadata: Option<Bytes>,
    pub data: Bytes,
}

impl Encodable for ExtFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        buf.put_u32(self.extended_type);
        if let Some(metadata) = &self.metadata {
            put_metadata(buf, metadata)?;
        }
        buf.put_slice(&self.data);
        Ok(())
    }
}

impl Decodable for ExtFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        require_remaining(buf, 4)?;
        let extended_type = buf.get_u32();
        let metadata = if header.has_metadata() {
            Some(get_metadata(buf)?)
        } else {
            None
        };
        let data = get_data(buf);
        Ok(ExtFrame {
            stream_id: header.stream_id,
            extended_type,
            ignore: header.flags.contains(Flags::IGNORE),
            metadata,
            data,
        })
    }
}

impl FrameBody for ExtFrame {
    fn stream_id(&self) -> u32 {
        self.stream_id
    }
    fn frame_type(&self) -> FrameType {
        FrameType::Ext
    }
    fn flags(&self) -> Flags {
        let mut flags = Flags::empty();
        if self.metadata.is_some() {
            flags |= Flags::METADATA;
        }
        if self.ignore {
            flags |= Flags::IGNORE;
        }
        flags
    }
}
