// ABOUTME: SETUP (0x01) — first frame of a connection; negotiates version, MIME types,
// ABOUTME: keepalive parameters, lease/resume opt-in, and an optional initial payload

use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;

use super::codec::{
    get_data, get_metadata, get_u8_length_prefixed_string, put_metadata,
    put_u8_length_prefixed_string, require_remaining, Decodable, Encodable, FrameCodecError,
};
use super::header::{FrameHeader, FrameType, Flags};

/// The default data/metadata MIME type negotiated when an application does not
/// override it, matching the config default named in the external interfaces section.
pub const DEFAULT_MIME_TYPE: &str = "application/binary";

#[derive(Clone, Debug, PartialEq)]
pub struct SetupFrame {
    /// Always 0 — SETUP is a stream-0 (connection-level) frame.
    pub stream_id: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub keepalive_interval_ms: u32,
    pub max_lifetime_ms: u32,
    pub resume_token: Option<Bytes>,
    pub honor_lease: bool,
    pub metadata_mime_type: String,
    pub data_mime_type: String,
    pub metadata: Option<Bytes>,
    pub data: Bytes,
}

impl SetupFrame {
    pub fn resume_enabled(&self) -> bool {
        self.resume_token.is_some()
    }
}

impl Encodable for SetupFrame {
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        buf.put_u16(self.major_version);
        buf.put_u16(self.minor_version);
        buf.put_u32(self.keepalive_interval_ms);
        buf.put_u32(self.max_lifetime_ms);
        if let Some(token) = &self.resume_token {
            if token.len() > u16::MAX as usize {
                return Err(FrameCodecError::MalformedFrame(
                    "resume token too long for u16 length prefix".into(),
                ));
            }
            buf.put_u16(token.len() as u16);
            buf.put_slice(token);
        }
        put_u8_length_prefixed_string(buf, &self.metadata_mime_type)?;
        put_u8_length_prefixed_string(buf, &self.data_mime_type)?;
        if let Some(metadata) = &self.metadata {
            put_metadata(buf, metadata)?;
        }
        buf.put_slice(&self.data);
        Ok(())
    }
}

impl Decodable for SetupFrame {
    fn decode_body(
        header: &FrameHeader,
        buf: &mut Cursor<&[u8]>,
    ) -> Result<Self, FrameCodecError> {
        use bytes::Buf;

        require_remaining(buf, 12)?;
        let major_version = buf.get_u16();
        let minor_version = buf.get_u16();
        let keepalive_interval_ms = buf.get_u32();
        let max_lifetime_ms = buf.get_u32();

        let resume_token = if header.flags.contains(Flags::RESUME_ENABLE) {
            require_remaining(buf, 2)?;
            let len = buf.get_u16() as usize;
            require_remaining(buf, len)?;
            let mut token = vec![0u8; len];
            buf.copy_to_slice(&mut token);
            Some(Bytes::from(token))
        } else {
            None
        };

        let metadata_mime_type = get_u8_length_prefixed_string(buf, "metadata_mime_type")?;
        let data_mime_type = get_u8_length_prefixed_string(buf, "data_mime_type")?;

        let metadata = if header.has_metadata() {
            Some(get_metadata(buf)?)
        } else {
            None
        };
        let data = get_data(buf);

        Ok(SetupFrame {
            stream_id: header.stream_id,
            major_version,
            minor_version,
            keepalive_interval_ms,
            max_lifetime_ms,
            resume_token,
            honor_lease: header.flags.contains(Flags::LEASE),
            metadata_mime_type,
            data_mime_type,
            metadata,
            data,
        })
    }
}

impl super::FrameBody for SetupFrame {
    fn stream_id(&self) -> u32 {
        self.stream_id
    }

    fn frame_type(&self) -> FrameType {
        FrameType::Setup
    }

    fn flags(&self) -> Flags {
        let mut flags = Flags::empty();
        if self.metadata.is_some() {
            flags |= Flags::METADATA;
        }
        if self.honor_lease {
            flags |= Flags::LEASE;
        }
        if self.resume_enabled() {
            flags |= Flags::RESUME_ENABLE;
        }
        flags
    }
}
