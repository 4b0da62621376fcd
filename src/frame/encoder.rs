//! # Heartbeat Frame Encoder
//!
//! Builds frames the way the device-side sender does.

use bytes::{BufMut, Bytes, BytesMut};

use super::protocol::*;

/// Encode a heartbeat frame
///
/// # Arguments
///
/// * `timestamp` - Sender timestamp (seconds since epoch)
/// * `payload` - Reserved payload bytes
///
/// # Returns
///
/// * `Bytes` - Complete `FRAME_SIZE` frame with magic and checksum filled in
///
/// # Examples
///
/// ```
/// use heartbeat_relay::frame::{encode_frame, validate, FRAME_SIZE};
/// use heartbeat_relay::frame::protocol::FRAME_PAYLOAD_SIZE;
///
/// let frame = encode_frame(1_700_000_000, &[0u8; FRAME_PAYLOAD_SIZE]);
/// assert_eq!(frame.len(), FRAME_SIZE);
/// assert!(validate(&frame, true));
/// ```
pub fn encode_frame(timestamp: u32, payload: &[u8; FRAME_PAYLOAD_SIZE]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_SIZE);
    buf.put_u16(FRAME_MAGIC);
    buf.put_u16(frame_checksum(timestamp, payload));
    buf.put_u32(timestamp);
    buf.put_slice(payload);
    buf.freeze()
}
