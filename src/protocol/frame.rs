//! Frame codec: stateless encode/decode between byte buffers and typed
//! messages.
//!
//! # Wire format
//!
//! ```text
//! [header 0xFE:1][payload_length:1][sequence:1][system_id:1][component_id:1]
//! [message_type_id:1][payload:N][checksum:2 LE]
//! ```
//!
//! The checksum is CRC-16/X.25 computed over everything after the start byte
//! (length through payload), matching the MAVLink v1 convention of excluding
//! the magic byte. Decode failures are reported, never fatal: the session
//! resynchronizes on the next start byte.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::messages::Message;
use super::messages::MessagePayload;
use super::registry::registry;
use crate::types::MessageId;

/// Start-of-frame marker.
pub const FRAME_HEADER: u8 = 0xFE;

/// Fixed header size preceding the payload.
pub const HEADER_SIZE: usize = 6;

/// Trailing checksum size.
pub const CHECKSUM_SIZE: usize = 2;

/// Largest possible frame (255-byte payload).
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + 255 + CHECKSUM_SIZE;

/// Errors produced while decoding a single frame.
///
/// All variants are recoverable at the stream level; the caller skips past
/// the bad start byte and resynchronizes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer does not begin with the start-of-frame marker.
    #[error("expected frame header 0xfe, found {found:#04x}")]
    BadHeader { found: u8 },

    /// Not enough bytes for the declared frame; wait for more input.
    #[error("frame truncated: need {needed} bytes, have {got}")]
    Truncated { needed: usize, got: usize },

    /// Stored checksum disagrees with the computed one.
    #[error("checksum mismatch: computed {computed:#06x}, found {found:#06x}")]
    ChecksumMismatch { computed: u16, found: u16 },

    /// Message type id has no registry entry.
    #[error("unknown message type id {id}")]
    UnknownMessageType { id: u8 },

    /// Declared payload length disagrees with the registered fixed layout.
    #[error("message {name} payload is {declared} bytes, layout requires {required}")]
    PayloadLength {
        name: &'static str,
        declared: usize,
        required: usize,
    },

    /// A payload field holds a value outside its registered domain.
    #[error("invalid {field} in {name} payload")]
    InvalidField {
        name: &'static str,
        field: &'static str,
    },
}

/// CRC-16/X.25: reflected polynomial 0x8408, init 0xFFFF, output inverted.
pub fn crc_x25(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
        }
    }
    !crc
}

/// Decode one frame from the front of `buf`.
///
/// On success returns the typed message and the number of bytes consumed so
/// a streaming caller can advance its buffer. Checks run in order: start
/// byte, truncation, checksum, registry lookup, payload shape.
pub fn decode(buf: &[u8]) -> Result<(Message, usize), DecodeError> {
    let minimum = HEADER_SIZE + CHECKSUM_SIZE;
    if buf.is_empty() {
        return Err(DecodeError::Truncated { needed: minimum, got: 0 });
    }
    if buf[0] != FRAME_HEADER {
        return Err(DecodeError::BadHeader { found: buf[0] });
    }
    if buf.len() < HEADER_SIZE {
        return Err(DecodeError::Truncated { needed: minimum, got: buf.len() });
    }

    let payload_len = buf[1] as usize;
    let total = HEADER_SIZE + payload_len + CHECKSUM_SIZE;
    if buf.len() < total {
        return Err(DecodeError::Truncated { needed: total, got: buf.len() });
    }

    let found = u16::from_le_bytes([buf[total - 2], buf[total - 1]]);
    let computed = crc_x25(&buf[1..HEADER_SIZE + payload_len]);
    if found != computed {
        return Err(DecodeError::ChecksumMismatch { computed, found });
    }

    let id = buf[5];
    let entry = registry()
        .get(id)
        .ok_or(DecodeError::UnknownMessageType { id })?;
    if payload_len != entry.payload_len {
        return Err(DecodeError::PayloadLength {
            name: entry.name,
            declared: payload_len,
            required: entry.payload_len,
        });
    }

    let payload = (entry.decode)(&buf[HEADER_SIZE..HEADER_SIZE + payload_len])?;
    let message = Message {
        id: MessageId(id),
        sequence: buf[2],
        system_id: buf[3],
        component_id: buf[4],
        payload,
    };
    Ok((message, total))
}

/// Encode a payload into a transmit-ready frame.
///
/// The sequence number comes from the owning session's counter; the codec
/// itself holds no state.
pub fn encode(payload: &MessagePayload, sequence: u8, system_id: u8, component_id: u8) -> Bytes {
    let body = payload.encode();
    debug_assert!(body.len() <= 255);

    let mut out = BytesMut::with_capacity(HEADER_SIZE + body.len() + CHECKSUM_SIZE);
    out.put_u8(FRAME_HEADER);
    out.put_u8(body.len() as u8);
    out.put_u8(sequence);
    out.put_u8(system_id);
    out.put_u8(component_id);
    out.put_u8(payload.message_id().0);
    out.put_slice(&body);
    let crc = crc_x25(&out[1..]);
    out.put_u16_le(crc);
    out.freeze()
}
