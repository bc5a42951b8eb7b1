//! Protocol module - packet wire format and framing.
//!
//! This module implements the lowest frame of the client protocol:
//! - 4-byte header encoding/decoding (type + 24-bit length)
//! - Packet buffer for accumulating partial reads

mod buffer;
mod packet;

pub use buffer::PacketBuffer;
pub use packet::{Packet, PacketType, HEAD_LENGTH, MAX_BODY_LENGTH};
