//! # Heartbeat Frame Decoder
//!
//! Validates and decodes received heartbeat datagrams.

use bytes::Buf;

use super::protocol::*;
use crate::error::FrameError;

/// Decode a heartbeat frame without checking magic or checksum
///
/// Bytes past `FRAME_SIZE` are ignored.
///
/// # Errors
///
/// Returns `FrameError::TooShort` if fewer than `FRAME_SIZE` bytes are given
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < FRAME_SIZE {
        return Err(FrameError::TooShort {
            len: bytes.len(),
            expected: FRAME_SIZE,
        });
    }

    let mut buf = &bytes[..FRAME_SIZE];
    let magic = buf.get_u16();
    let checksum = buf.get_u16();
    let timestamp = buf.get_u32();
    let mut payload = [0u8; FRAME_PAYLOAD_SIZE];
    buf.copy_to_slice(&mut payload);

    Ok(Frame {
        magic,
        checksum,
        timestamp,
        payload,
    })
}

/// Check a received datagram
///
/// # Arguments
///
/// * `bytes` - Datagram as received
/// * `validation` - When false, any datagram of sufficient length passes
///
/// # Errors
///
/// Returns the first reason the datagram is rejected:
/// - Datagram is shorter than a frame
/// - Header magic is wrong
/// - Checksum does not match
pub fn check_frame(bytes: &[u8], validation: bool) -> Result<(), FrameError> {
    let frame = decode_frame(bytes)?;

    if !validation {
        return Ok(());
    }

    if frame.magic != FRAME_MAGIC {
        return Err(FrameError::BadMagic(frame.magic));
    }

    let computed = frame.expected_checksum();
    if computed != frame.checksum {
        return Err(FrameError::ChecksumMismatch {
            received: frame.checksum,
            computed,
        });
    }

    Ok(())
}

/// Returns true if the datagram is an acceptable heartbeat frame
pub fn validate(bytes: &[u8], validation: bool) -> bool {
    check_frame(bytes, validation).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encoder::encode_frame;

    fn sample_payload() -> [u8; FRAME_PAYLOAD_SIZE] {
        let mut payload = [0u8; FRAME_PAYLOAD_SIZE];
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte = (i * 7 % 251) as u8;
        }
        payload
    }

    #[test]
    fn test_decode_frame_too_short() {
        let result = decode_frame(&[0xA0, 0xF9, 0x00]);
        assert_eq!(result, Err(FrameError::TooShort { len: 3, expected: FRAME_SIZE }));
    }

    #[test]
    fn test_decode_frame_fields() {
        let frame = encode_frame(0x0102_0304, &sample_payload());
        let decoded = decode_frame(&frame).unwrap();

        assert_eq!(decoded.magic, FRAME_MAGIC);
        assert_eq!(decoded.timestamp, 0x0102_0304);
        assert_eq!(decoded.payload, sample_payload());
        assert_eq!(decoded.checksum, decoded.expected_checksum());
    }

    #[test]
    fn test_valid_frame_passes() {
        let frame = encode_frame(1_700_000_000, &sample_payload());
        assert!(validate(&frame, true));
        assert_eq!(check_frame(&frame, true), Ok(()));
    }

    #[test]
    fn test_short_frames_never_validate() {
        let frame = encode_frame(1_700_000_000, &sample_payload());

        for len in [0, 1, 4, 8, FRAME_SIZE / 2, FRAME_SIZE - 1] {
            assert!(!validate(&frame[..len], true), "len {} accepted", len);
            assert!(!validate(&frame[..len], false), "len {} accepted without validation", len);
        }
    }

    #[test]
    fn test_longer_datagram_uses_leading_frame() {
        let mut datagram = encode_frame(5, &sample_payload()).to_vec();
        datagram.extend_from_slice(&[0xEE; 32]);
        assert!(validate(&datagram, true));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut frame = encode_frame(5, &sample_payload()).to_vec();
        frame[0] = 0xA1;

        assert_eq!(check_frame(&frame, true), Err(FrameError::BadMagic(0xA1F9)));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut frame = encode_frame(5, &sample_payload()).to_vec();
        frame[2] ^= 0xFF;

        assert!(matches!(
            check_frame(&frame, true),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_any_single_bit_flip_after_header_invalidates() {
        let frame = encode_frame(1_700_000_000, &sample_payload()).to_vec();

        for byte in FRAME_HEADER_SIZE..FRAME_SIZE {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    !validate(&corrupted, true),
                    "flip of bit {} in byte {} went unnoticed",
                    bit,
                    byte
                );
            }
        }
    }

    #[test]
    fn test_validation_disabled_accepts_garbage_of_full_length() {
        let garbage = [0x55u8; FRAME_SIZE];
        assert!(!validate(&garbage, true));
        assert!(validate(&garbage, false));
    }

    #[test]
    fn test_all_zero_body_golden_frame() {
        let mut frame = [0u8; FRAME_SIZE];
        frame[0] = 0xA0;
        frame[1] = 0xF9;
        // checksum of an all-zero body is 0x0000
        assert!(validate(&frame, true));
    }

    #[test]
    fn test_hand_built_frame_with_timestamp() {
        let mut frame = [0u8; FRAME_SIZE];
        frame[0..2].copy_from_slice(&FRAME_MAGIC.to_be_bytes());
        frame[2..4].copy_from_slice(&0x6684u16.to_be_bytes());
        frame[4..8].copy_from_slice(&1000u32.to_be_bytes());
        assert!(validate(&frame, true));
    }
}
