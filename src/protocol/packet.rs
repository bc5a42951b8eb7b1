//! Packet encoding and decoding.
//!
//! Implements the 4-byte header format:
//! ```text
//! ┌────────┬──────────────────────┬──────────────────┐
//! │ Type   │ Length               │ Data             │
//! │ 1 byte │ 3 bytes, uint24 BE   │ Length bytes     │
//! └────────┴──────────────────────┴──────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MeshwireError, Result};

/// Header size in bytes (fixed, exactly 4).
pub const HEAD_LENGTH: usize = 4;

/// Maximum body length representable by the 24-bit length field.
pub const MAX_BODY_LENGTH: usize = 0xFF_FF_FF;

/// Packet type byte.
///
/// Types outside this set are a protocol error (`BadType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Client-initiated handshake; server replies with the sys parameters.
    Handshake = 0x01,
    /// Client acknowledgment that completes the handshake.
    HandshakeAck = 0x02,
    /// Keep-alive in both directions.
    Heartbeat = 0x03,
    /// Carries an application-layer message.
    Data = 0x04,
    /// Server-initiated disconnect notice.
    Kick = 0x05,
}

impl PacketType {
    /// Decode a type byte, rejecting anything outside the enumerated set.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(PacketType::Handshake),
            0x02 => Ok(PacketType::HandshakeAck),
            0x03 => Ok(PacketType::Heartbeat),
            0x04 => Ok(PacketType::Data),
            0x05 => Ok(PacketType::Kick),
            other => Err(MeshwireError::BadType(other)),
        }
    }
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet type.
    pub kind: PacketType,
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub data: Bytes,
}

impl Packet {
    /// Create a new packet from a type and body.
    pub fn new(kind: PacketType, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Create a packet with an empty body (heartbeat, handshake ack, kick).
    pub fn empty(kind: PacketType) -> Self {
        Self {
            kind,
            data: Bytes::new(),
        }
    }

    /// Encode the packet as `type || be24(len) || data`.
    ///
    /// # Errors
    ///
    /// Fails with `Protocol` if the body exceeds the 24-bit length field.
    pub fn pack(&self) -> Result<Bytes> {
        if self.data.len() > MAX_BODY_LENGTH {
            return Err(MeshwireError::Protocol(format!(
                "packet body {} exceeds maximum {}",
                self.data.len(),
                MAX_BODY_LENGTH
            )));
        }

        let mut buf = BytesMut::with_capacity(HEAD_LENGTH + self.data.len());
        buf.put_u8(self.kind as u8);
        let len = self.data.len() as u32;
        buf.put_u8((len >> 16) as u8);
        buf.put_u8((len >> 8) as u8);
        buf.put_u8(len as u8);
        buf.extend_from_slice(&self.data);
        Ok(buf.freeze())
    }

    /// Decode one packet from the front of `buf`.
    ///
    /// Returns the packet and the trailing remainder. If the header is
    /// complete but the body is not yet fully present, returns `Ok(None)`
    /// and the caller should accumulate more bytes.
    ///
    /// # Errors
    ///
    /// - `ShortHeader` if fewer than [`HEAD_LENGTH`] bytes are available.
    /// - `BadType` if the type byte is outside the enumerated set.
    pub fn unpack(buf: &[u8]) -> Result<Option<(Packet, &[u8])>> {
        if buf.len() < HEAD_LENGTH {
            return Err(MeshwireError::ShortHeader(buf.len()));
        }

        let kind = PacketType::from_byte(buf[0])?;
        let body = ((buf[1] as usize) << 16) | ((buf[2] as usize) << 8) | buf[3] as usize;

        if buf.len() < HEAD_LENGTH + body {
            return Ok(None);
        }

        let packet = Packet {
            kind,
            data: Bytes::copy_from_slice(&buf[HEAD_LENGTH..HEAD_LENGTH + body]),
        };
        Ok(Some((packet, &buf[HEAD_LENGTH + body..])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let packet = Packet::new(PacketType::Data, &b"hello"[..]);
        let bytes = packet.pack().unwrap();

        assert_eq!(bytes.len(), HEAD_LENGTH + 5);
        assert_eq!(bytes[0], 0x04);
        assert_eq!(&bytes[1..4], &[0x00, 0x00, 0x05]);
        assert_eq!(&bytes[4..], b"hello");
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let original = Packet::new(PacketType::Handshake, &b"{}"[..]);
        let encoded = original.pack().unwrap();

        let (decoded, rest) = Packet::unpack(&encoded).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_unpack_preserves_remainder() {
        let first = Packet::new(PacketType::Data, &b"one"[..]);
        let second = Packet::new(PacketType::Heartbeat, Bytes::new());

        let mut bytes = first.pack().unwrap().to_vec();
        bytes.extend_from_slice(&second.pack().unwrap());

        let (decoded, rest) = Packet::unpack(&bytes).unwrap().unwrap();
        assert_eq!(decoded, first);

        let (decoded, rest) = Packet::unpack(rest).unwrap().unwrap();
        assert_eq!(decoded, second);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_unpack_short_header() {
        let result = Packet::unpack(&[0x01, 0x00]);
        assert!(matches!(result, Err(MeshwireError::ShortHeader(2))));
    }

    #[test]
    fn test_unpack_bad_type() {
        let result = Packet::unpack(&[0xFF, 0x00, 0x00, 0x00]);
        assert!(matches!(result, Err(MeshwireError::BadType(0xFF))));
    }

    #[test]
    fn test_unpack_incomplete_body() {
        let packet = Packet::new(PacketType::Data, &b"hello"[..]);
        let bytes = packet.pack().unwrap();

        // Header complete, body short by one byte.
        let result = Packet::unpack(&bytes[..bytes.len() - 1]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_big_endian_length() {
        let body = vec![0u8; 0x010203];
        let packet = Packet::new(PacketType::Data, body);
        let bytes = packet.pack().unwrap();

        assert_eq!(&bytes[1..4], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_pack_oversized_body() {
        let packet = Packet::new(PacketType::Data, vec![0u8; MAX_BODY_LENGTH + 1]);
        assert!(matches!(packet.pack(), Err(MeshwireError::Protocol(_))));
    }

    #[test]
    fn test_empty_body() {
        let packet = Packet::empty(PacketType::Heartbeat);
        let bytes = packet.pack().unwrap();

        assert_eq!(bytes.len(), HEAD_LENGTH);
        let (decoded, rest) = Packet::unpack(&bytes).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_all_type_bytes() {
        assert_eq!(PacketType::from_byte(0x01).unwrap(), PacketType::Handshake);
        assert_eq!(
            PacketType::from_byte(0x02).unwrap(),
            PacketType::HandshakeAck
        );
        assert_eq!(PacketType::from_byte(0x03).unwrap(), PacketType::Heartbeat);
        assert_eq!(PacketType::from_byte(0x04).unwrap(), PacketType::Data);
        assert_eq!(PacketType::from_byte(0x05).unwrap(), PacketType::Kick);
        assert!(PacketType::from_byte(0x00).is_err());
        assert!(PacketType::from_byte(0x06).is_err());
    }
}
