//! # Frame Constants and Types
//!
//! Wire layout of a heartbeat frame. All multi-byte fields travel in
//! network byte order.
//!
//! ```text
//! offset  size  field
//! 0       2     magic (0xA0F9)
//! 2       2     checksum (CRC-16 of everything after the header)
//! 4       4     sender timestamp, seconds since epoch
//! 8       1016  reserved payload
//! ```

use super::crc::crc16;

/// Header magic of every heartbeat frame
pub const FRAME_MAGIC: u16 = 0xA0F9;

/// Total frame size in bytes
pub const FRAME_SIZE: usize = 1024;

/// Header size (magic + checksum); the checksum covers everything after it
pub const FRAME_HEADER_SIZE: usize = 4;

/// Timestamp field size
pub const FRAME_TIMESTAMP_SIZE: usize = 4;

/// Reserved payload size
pub const FRAME_PAYLOAD_SIZE: usize = FRAME_SIZE - FRAME_HEADER_SIZE - FRAME_TIMESTAMP_SIZE;

/// Seed of the frame checksum
pub const FRAME_CRC_SEED: u16 = 0;

/// Decoded heartbeat frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header magic as received
    pub magic: u16,

    /// Checksum as received
    pub checksum: u16,

    /// Sender-side timestamp (seconds since epoch)
    pub timestamp: u32,

    /// Opaque reserved bytes
    pub payload: [u8; FRAME_PAYLOAD_SIZE],
}

impl Frame {
    /// Checksum this frame should carry
    pub fn expected_checksum(&self) -> u16 {
        frame_checksum(self.timestamp, &self.payload)
    }
}

/// Compute the checksum of a frame body
///
/// The device-side sender fills in the checksum while the timestamp is
/// still in its native little-endian layout and only then converts the
/// field to network order. The receiver restores the host value before
/// checksumming, so the timestamp enters the CRC as little-endian bytes.
pub fn frame_checksum(timestamp: u32, payload: &[u8]) -> u16 {
    let crc = crc16(FRAME_CRC_SEED, &timestamp.to_le_bytes());
    crc16(crc, payload)
}
