// ABOUTME: The 6-byte common frame header: stream id, frame type, and flags bitfield
// ABOUTME: shared by every RSocket frame type per the wire protocol's frame layout

use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};
use num_enum::TryFromPrimitive;
use std::io::Cursor;

use super::codec::{get_u31, require_remaining, FrameCodecError};

/// RSocket frame type codes (low 6 bits of the type/flags word).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Setup = 0x01,
    Lease = 0x02,
    Keepalive = 0x03,
    RequestResponse = 0x04,
    RequestFnf = 0x05,
    RequestStream = 0x06,
    RequestChannel = 0x07,
    RequestN = 0x08,
    Cancel = 0x09,
    Payload = 0x0A,
    Error = 0x0B,
    MetadataPush = 0x0C,
    Resume = 0x0D,
    ResumeOk = 0x0E,
    Ext = 0x3F,
}

bitflags! {
    /// The 10-bit flags field. Not every flag is meaningful for every frame type —
    /// see each frame module's doc comment for which bits it defines.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Flags: u16 {
        /// Metadata is present (and length-prefixed) in the frame body.
        const METADATA = 0b00_0001_0000_0000;
        /// Ignore this frame if the frame type or flag is not understood.
        const IGNORE   = 0b00_0010_0000_0000;
        /// SETUP: client requests the peer honor RESUME semantics.
        const RESUME_ENABLE = 0b0000_0000_1000_0000;
        /// SETUP: client requests the peer honor LEASE semantics.
        const LEASE = 0b0000_0000_0100_0000;
        /// KEEPALIVE: sender expects an echo (RESPOND=1) vs. is itself the echo (0).
        const RESPOND = 0b0000_0000_1000_0000;
        /// REQUEST_*/PAYLOAD: an additional fragment follows (unsupported at the core
        /// boundary; see the fragmentation Non-goal). Decoded for wire fidelity only.
        const FOLLOWS = 0b0000_0000_1000_0000;
        /// PAYLOAD/REQUEST_CHANNEL: this is the terminal frame for the stream direction.
        const COMPLETE = 0b0000_0000_0100_0000;
        /// PAYLOAD: this frame carries a data/metadata element (as opposed to being a
        /// bare COMPLETE marker).
        const NEXT = 0b0000_0000_0010_0000;
    }
}

/// Common 6-byte header: 4-byte stream id (high bit reserved 0) then a 2-byte
/// `(frame_type << 10) | flags` word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub stream_id: u32,
    pub frame_type: FrameType,
    pub flags: Flags,
}

impl FrameHeader {
    pub const SIZE: usize = 6;

    pub fn new(stream_id: u32, frame_type: FrameType, flags: Flags) -> Self {
        Self {
            stream_id,
            frame_type,
            flags,
        }
    }

    pub fn has_metadata(&self) -> bool {
        self.flags.contains(Flags::METADATA)
    }

    pub fn decode(buf: &mut Cursor<&[u8]>) -> Result<Self, FrameCodecError> {
        let stream_id = get_u31(buf)?;
        require_remaining(buf, 2)?;
        let word = buf.get_u16();
        let type_code = (word >> 10) as u8;
        let flags_bits = word & 0x03FF;
        let frame_type = FrameType::try_from(type_code)
            .map_err(|_| FrameCodecError::UnknownFrameType(type_code))?;
        // `from_bits_retain` keeps unknown bits around (harmless, per IGNORE semantics)
        // rather than silently dropping them.
        let flags = Flags::from_bits_retain(flags_bits);
        Ok(Self {
            stream_id,
            frame_type,
            flags,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), FrameCodecError> {
        if self.stream_id & 0x8000_0000 != 0 {
            return Err(FrameCodecError::ReservedStreamIdBit(self.stream_id));
        }
        buf.put_u32(self.stream_id);
        let type_code = self.frame_type as u8 as u16;
        let flags_bits = self.flags.bits() & 0x03FF;
        buf.put_u16((type_code << 10) | flags_bits);
        Ok(())
    }
}
