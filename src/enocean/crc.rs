//! # Frame Integrity Primitives
//!
//! CRC-8 and additive checksum used by ERP1 frames.
//!
//! **Polynomial**: 0x07 (x^8 + x^2 + x + 1), MSB-first
//! **Initial Value**: 0x00
//!
//! Every function takes a `skip_last` flag that leaves the final byte out
//! of the computation, so a frame can be checked against its own trailing
//! hash byte.

use super::protocol::CRC8_POLYNOMIAL;

/// Precomputed lookup table for the ERP1 polynomial
const CRC8_TABLE: [u8; 256] = generate_crc8_table(CRC8_POLYNOMIAL);

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table(polynomial: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ polynomial;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

fn covered(data: &[u8], skip_last: bool) -> &[u8] {
    if skip_last {
        &data[..data.len().saturating_sub(1)]
    } else {
        data
    }
}

/// Calculate a bit-serial CRC-8 with an arbitrary polynomial
///
/// # Arguments
///
/// * `data` - Bytes to cover
/// * `polynomial` - Generator polynomial without the x^8 term
/// * `skip_last` - Leave the final byte out
///
/// # Examples
///
/// ```
/// use enocean_gateway::enocean::crc::crc8;
///
/// let frame = [0xA5, 0x00, 0x80, 0x28, 0x28, 0x05, 0x80, 0xCC, 0x3A, 0x80, 0xB9];
/// assert_eq!(crc8(&frame, 0x07, true), 0xB9);
/// ```
pub fn crc8(data: &[u8], polynomial: u8, skip_last: bool) -> u8 {
    let mut crc: u8 = 0;

    for &byte in covered(data, skip_last) {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ polynomial;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// CRC-8 with the ERP1 polynomial, using the lookup table
pub fn crc8_erp1(data: &[u8], skip_last: bool) -> u8 {
    let mut crc: u8 = 0;

    for &byte in covered(data, skip_last) {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }

    crc
}

/// Sum of the covered bytes, truncated to 8 bits
pub fn checksum(data: &[u8], skip_last: bool) -> u8 {
    covered(data, skip_last)
        .iter()
        .fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// XOR of the covered bytes
pub fn checkxor(data: &[u8], skip_last: bool) -> u8 {
    covered(data, skip_last).iter().fold(0u8, |acc, &byte| acc ^ byte)
}
