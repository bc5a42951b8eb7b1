//! Packet buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Socket reads land here in
//! arbitrary chunks; `push` extracts every complete frame and keeps any
//! trailing partial frame buffered for the next read. Frame extraction is
//! split-invariant: the packet sequence does not depend on where the byte
//! stream was cut.

use bytes::{Buf, BytesMut};

use super::packet::{Packet, PacketType, HEAD_LENGTH};
use crate::error::Result;

/// Buffer for accumulating incoming bytes and extracting complete packets.
pub struct PacketBuffer {
    buffer: BytesMut,
}

impl PacketBuffer {
    /// Create an empty packet buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Push data into the buffer and extract all complete packets, in order.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns `BadType` if a frame header carries an unknown type byte.
    /// Framing errors are unrecoverable; the caller must close the
    /// connection and discard the buffer.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Packet>> {
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();
        while self.buffer.len() >= HEAD_LENGTH {
            let kind = PacketType::from_byte(self.buffer[0])?;
            let body = ((self.buffer[1] as usize) << 16)
                | ((self.buffer[2] as usize) << 8)
                | self.buffer[3] as usize;

            if self.buffer.len() < HEAD_LENGTH + body {
                break;
            }

            self.buffer.advance(HEAD_LENGTH);
            let data = self.buffer.split_to(body).freeze();
            packets.push(Packet { kind, data });
        }

        Ok(packets)
    }

    /// Number of buffered bytes not yet forming a complete packet.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard any buffered partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}
