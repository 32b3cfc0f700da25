//! CRC-16/CCITT-FALSE checksum for EMV BR Code payloads.
//!
//! The EMV payload standard closes every payload with a 4-hex-digit CRC so
//! wallet scanners can reject corrupted strings. The variant is fixed:
//! initial register `0xFFFF`, polynomial `0x1021`, no reflection, no final
//! xor, processed MSB-first over the payload's UTF-8 bytes.

const POLYNOMIAL: u16 = 0x1021;
const INITIAL: u16 = 0xFFFF;

/// Computes the raw 16-bit checksum over `data`.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = INITIAL;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLYNOMIAL;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Computes the checksum of a payload string as 4 uppercase hex digits,
/// the form appended to the EMV payload.
#[must_use]
pub fn checksum(data: &str) -> String {
    format!("{:04X}", crc16(data.as_bytes()))
}
