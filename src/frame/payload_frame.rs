// ABOUTME: PAYLOAD (0x0A) — the only post-initiation data-carrying frame, flagged
// ABOUTME: NEXT, COMPLETE, or both; order of NEXTs followed by a COMPLETE must be preserved

use bytes::{Bytes, BytesMut};
use std::io::Cursor;

use super::codec::{get_data, get_metadata, put_metadata, Decodable, Encodable, FrameCodecError};
use super::header::{FrameHeader, FrameType, Flags};
use super::FrameBody;

#[derive(Clone, Debug, PartialEq)]
pub struct PayloadFrame {
    pub stream_id: u32,
    pub next: bool,
    pub complete: bool,
    pub metadata: Option<Bytes>,
    pub data: Bytes,
}

impl PayloadFrame {
    pub fn next(stream_id: u32, payload: crate::payload::Payload) -> Self {
        Self {
            stream_id,
            next: true,
            complete: false,
            metadata: payload.metadata,
            data: payload.data,
        }
    }

    pub fn next_complete(stream_id: u32, payload: crate::payload::Payload) -> Self {
        Self {
            stream_id,
            next: true,
            complete: true,
            metadata: payload.metadata,
            data: payload.data,
        }
    }

    pub fn complete(stream_id: u32) -> Self {
        Self {
            stream_id,
            next: false,
            complete: true,
            metadata: None,
            data: Bytes::new(),
        }
    }

    pub fn into_payload(self) -> crate::payload::Payload {
        crate::payload::Payload {
            metadata: self.metadata,
            data: self.data,
        }
    }
}

impl Encodable for PayloadFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        if let Some(metadata) = &self.metadata {
            put_metadata(buf, metadata)?;
        }
        buf.extend_from_slice(&self.data);
        Ok(())
    }
}

impl Decodable for PayloadFrame {
    fn decode_body(header: &FrameHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        if header.flags.contains(Flags::FOLLOWS) {
            return Err(FrameCodecError::Fragmented);
        }
        let next = header.flags.contains(Flags::NEXT);
        let complete = header.flags.contains(Flags::COMPLETE);
        if !next && !complete {
            return Err(FrameCodecError::MalformedFrame(
                "PAYLOAD frame must set NEXT, COMPLETE, or both".into(),
            ));
        }
        let metadata = if header.has_metadata() {
            Some(get_metadata(buf)?)
        } else {
            None
        };
        let data = get_data(buf);
        Ok(PayloadFrame {
            stream_id: header.stream_id,
            next,
            complete,
            metadata,
            data,
        })
    }
}

impl FrameBody for PayloadFrame {
    fn stream_id(&self) -> u32 {
        self.stream_id
    }
    fn frame_type(&self) -> FrameType {
        FrameType::Payload
    }
    fn flags(&self) -> Flags {
        let mut flags = Flags::empty();
        if self.metadata.is_some() {
            flags |= Flags::METADATA;
        }
        if self.next {
            flags |= Flags::NEXT;
        }
        if self.complete {
            flags |= Flags::COMPLETE;
        }
        flags
    }
}
