//! # PHY Decoder
//!
//! Turns a demodulated sub-carrier capture into candidate frames.
//!
//! A telegram starts with the 4-bit SOF pattern `0110` and continues with
//! 12-bit symbols, one per frame byte:
//!
//! ```text
//!  b0 b1 b2 | b3 | b4 b5 b6 | b7 | b8 b9 | b10 b11
//!  data     | !b2| data     | !b6| data  | 01 = end, 10 = more
//! ```
//!
//! The eight data bits are sent inverted. A candidate that breaks either
//! parity pair or carries an unknown sync code is abandoned and scanning
//! resumes one bit past its SOF, so overlapping and repeated telegrams in
//! one capture are all found.

use tracing::trace;

use super::frame::Frame;

/// Start-of-frame bit pattern
const SOF_PATTERN: [u8; 4] = [0, 1, 1, 0];

const SYMBOL_BITS: usize = 12;

/// Sync code of the final symbol
const SYNC_END: u8 = 0b01;

/// Sync code of a symbol followed by another
const SYNC_MORE: u8 = 0b10;

/// Read bit `index` of `buf`, MSB-first within each byte
pub fn get_bit(buf: &[u8], index: usize) -> u8 {
    (buf[index / 8] >> (7 - index % 8)) & 1
}

/// Find the next SOF at or after `from`; returns `end` when there is none
pub fn find_sof(buf: &[u8], from: usize, end: usize) -> usize {
    let mut i = from;
    while i + SOF_PATTERN.len() <= end {
        if SOF_PATTERN
            .iter()
            .enumerate()
            .all(|(k, &bit)| get_bit(buf, i + k) == bit)
        {
            return i;
        }
        i += 1;
    }
    end
}

/// Decode one 12-bit symbol into `(byte, sync)`, or `None` on parity or
/// sync failure
fn decode_symbol(buf: &[u8], at: usize) -> Option<(u8, u8)> {
    let mut b = [0u8; SYMBOL_BITS];
    for (k, bit) in b.iter_mut().enumerate() {
        *bit = get_bit(buf, at + k);
    }

    if b[2] + b[3] != 1 || b[6] + b[7] != 1 {
        return None;
    }

    let sync = (b[10] << 1) | b[11];
    if sync != SYNC_END && sync != SYNC_MORE {
        return None;
    }

    let raw = (b[0] << 7) | (b[1] << 6) | (b[2] << 5) | (b[4] << 4)
        | (b[5] << 3) | (b[6] << 2) | (b[8] << 1) | b[9];

    Some((!raw, sync))
}

/// Decode the symbols following the SOF at `sof`
///
/// Returns the emitted bytes and the bit position just past the last
/// consumed symbol, or `None` if the candidate has to be abandoned.
fn decode_candidate(buf: &[u8], sof: usize, end: usize) -> Option<(Vec<u8>, usize)> {
    let mut pos = sof + SOF_PATTERN.len();
    let mut bytes = Vec::new();

    while pos + SYMBOL_BITS <= end {
        let (byte, sync) = decode_symbol(buf, pos)?;
        bytes.push(byte);
        pos += SYMBOL_BITS;
        if sync == SYNC_END {
            break;
        }
    }

    Some((bytes, pos))
}

/// Extract every frame found in a capture
///
/// Frames are returned whether or not their hash is correct; check
/// [`Frame::crc_ok`] before acting on one. Malformed input only ever
/// yields fewer frames.
///
/// # Examples
///
/// ```
/// use enocean_gateway::enocean::decoder::get_frames;
///
/// let capture = hex::decode("00ab2ed7773776d76d776d37714f69337729480000000000004688215004").unwrap();
/// let frames = get_frames(&capture);
/// assert_eq!(frames[0].to_string(), "a5008028280580cc3a80b9");
/// ```
pub fn get_frames(buf: &[u8]) -> Vec<Frame> {
    let end = buf.len() * 8;
    let mut frames = Vec::new();
    let mut from = 0;

    loop {
        let sof = find_sof(buf, from, end);
        if sof >= end {
            break;
        }

        match decode_candidate(buf, sof, end) {
            Some((bytes, next)) => {
                match Frame::from_bytes(bytes) {
                    Ok(frame) => {
                        trace!("PHY frame at bit {}: {}", sof, frame.describe());
                        frames.push(frame);
                    }
                    Err(e) => trace!("PHY candidate at bit {} dropped: {}", sof, e),
                }
                from = next.max(sof + 1);
            }
            None => from = sof + 1,
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enocean::encoder::encode;

    const CAPTURE: &str = "00ab2ed7773776d76d776d37714f69337729480000000000004688215004";

    #[test]
    fn test_get_bit_msb_first() {
        let buf = [0b1000_0001, 0b0100_0000];
        assert_eq!(get_bit(&buf, 0), 1);
        assert_eq!(get_bit(&buf, 1), 0);
        assert_eq!(get_bit(&buf, 7), 1);
        assert_eq!(get_bit(&buf, 9), 1);
    }

    #[test]
    fn test_find_sof() {
        // 0x55 preamble then 0110
        let buf = [0x55, 0x60];
        assert_eq!(find_sof(&buf, 0, 16), 8);
        assert_eq!(find_sof(&buf, 9, 16), 16);
        assert_eq!(find_sof(&[], 0, 0), 0);
    }

    #[test]
    fn test_decode_known_capture() {
        let capture = hex::decode(CAPTURE).unwrap();
        let frames = get_frames(&capture);

        assert!(!frames.is_empty());
        assert_eq!(frames[0].to_string(), "a5008028280580cc3a80b9");
        assert!(frames[0].crc_ok());
    }

    #[test]
    fn test_decode_truncated_captures() {
        let capture = hex::decode(CAPTURE).unwrap();
        for len in 0..capture.len() {
            // Must never panic, whatever is left
            let _ = get_frames(&capture[..len]);
        }
        assert!(get_frames(&capture[..4]).is_empty());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(get_frames(&[]).is_empty());
        assert!(get_frames(&[0x00; 32]).is_empty());
        assert!(get_frames(&[0xFF; 32]).is_empty());

        let noise: Vec<u8> = (0..200u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
        for frame in get_frames(&noise) {
            assert!(frame.size() >= 7 && frame.size() <= 21);
        }
    }

    #[test]
    fn test_decode_corrupted_bit_abandons_candidate() {
        let frame = Frame::from_bytes(hex::decode("a6a52b5434080580cc3aaabbccdd8032").unwrap()).unwrap();
        let mut encoded = encode(&frame);
        // Break the parity pair of the first symbol (bit 3 after the SOF)
        encoded[1] ^= 0b0000_0001;
        assert!(get_frames(&encoded).iter().all(|f| *f != frame));
    }

    #[test]
    fn test_decode_repeated_transmissions() {
        let frame = Frame::from_bytes(hex::decode("a5008028280580cc3a80b9").unwrap()).unwrap();
        let mut capture = encode(&frame);
        capture.extend_from_slice(&[0x00, 0x00]);
        capture.extend_from_slice(&encode(&frame));

        let frames = get_frames(&capture);
        assert_eq!(frames.iter().filter(|f| **f == frame).count(), 2);
    }
}
