//! Wire packets.
//!
//! A packet is the unit of atomic processing handed to us by the (external)
//! TCP receive loop: exactly 8192 bytes, 4096 little-endian `u16` words. The
//! original's `X3X2ListModeFrameDecoderDefaults::max_size` fixes the same
//! 8192-byte frame.

use crate::error::{Error, Result};
use crate::field::{Field, decode_word};

/// Fixed wire packet size in bytes.
pub const PACKET_BYTES: usize = 8192;

/// Number of 16-bit fields per packet.
pub const FIELDS_PER_PACKET: usize = PACKET_BYTES / 2;

/// A validated, fixed-size 8192-byte detector packet.
///
/// Construction is the only place packet length is checked; everything
/// downstream can assume exactly [`FIELDS_PER_PACKET`] fields.
pub struct Packet<'a> {
    bytes: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Validate and wrap a raw buffer.
    ///
    /// Returns [`Error::MalformedPacket`] if `bytes.len() != PACKET_BYTES`.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != PACKET_BYTES {
            return Err(Error::MalformedPacket {
                reason: format!("expected {PACKET_BYTES} bytes, got {}", bytes.len()),
            });
        }
        Ok(Self { bytes })
    }

    /// Iterate over the packet's fields in wire order.
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.bytes
            .chunks_exact(2)
            .map(|w| decode_word(u16::from_le_bytes([w[0], w[1]])))
    }
}
