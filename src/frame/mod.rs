//! # Heartbeat Frame Module
//!
//! Codec for the fixed-size heartbeat frame sent by field devices.
//!
//! This module handles:
//! - Frame layout constants (magic, sizes)
//! - CRC-16 checksum calculation (nibble-table variant)
//! - Frame validation and decoding
//! - Frame encoding, bit-compatible with the device-side sender

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;

pub use decoder::{check_frame, decode_frame, validate};
pub use encoder::encode_frame;
pub use protocol::{Frame, FRAME_MAGIC, FRAME_SIZE};
