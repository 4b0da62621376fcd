//! # CRC-16 Implementation
//!
//! Nibble-table CRC-16 used by the heartbeat frame. Each byte is folded in
//! as two 4-bit steps, low nibble first, with a 12-bit feedback mask.
//!
//! **Reflected polynomial**: 0xA001
//! **Initial Value**: caller supplied (0 for frames)

/// CRC-16 nibble lookup table (reflected polynomial 0xA001)
const CRC16_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401,
    0xA001, 0x6C00, 0x7800, 0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
];

/// Reflected polynomial the table is derived from
#[cfg(test)]
const CRC16_POLY: u16 = 0xA001;

#[inline]
fn step(crc: u16, nibble: u8) -> u16 {
    let r = CRC16_TABLE[(crc & 0xF) as usize];
    let crc = (crc >> 4) & 0x0FFF;
    crc ^ r ^ CRC16_TABLE[(nibble & 0xF) as usize]
}

/// Calculate the CRC-16 checksum of `data`
///
/// # Arguments
///
/// * `seed` - Starting CRC value (0 for a fresh checksum, or a previous
///   result to continue over more data)
/// * `data` - Bytes to checksum
///
/// # Returns
///
/// * `u16` - Calculated checksum
///
/// # Examples
///
/// ```
/// use heartbeat_relay::frame::crc::crc16;
///
/// assert_eq!(crc16(0, b"123456789"), 0xBB3D);
/// ```
pub fn crc16(seed: u16, data: &[u8]) -> u16 {
    data.iter().fold(seed, |crc, &byte| {
        let crc = step(crc, byte);
        step(crc, byte >> 4)
    })
}

/// Bitwise CRC-16 (slow, for verification)
#[cfg(test)]
fn crc16_slow(seed: u16, data: &[u8]) -> u16 {
    let mut crc = seed;

    for &byte in data {
        crc ^= byte as u16;

        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}
