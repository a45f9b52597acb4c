//! # PHY Encoder
//!
//! Turns a frame into the demodulated bitstream handed to the radio:
//! a `0x55` preamble byte, the `0110` sync nibble, then one 12-bit symbol
//! per frame byte (see [`super::decoder`] for the symbol layout).
//!
//! Symbols are 12 bits wide, so every other byte boundary falls in the
//! middle of a symbol. The leftover nibble is carried into the next
//! symbol and flushed, left aligned, after the last one.

use super::frame::Frame;

/// Preamble byte sent before the sync nibble
pub const PREAMBLE: u8 = 0x55;

/// Sync nibble seeding the carry register
const SYNC_NIBBLE: u16 = 0b0110;

/// Sync code of the final symbol
const SYNC_END: u16 = 0b01;

/// Sync code of a symbol followed by another
const SYNC_MORE: u16 = 0b10;

/// Build the 12-bit symbol for one (already inverted) data byte
fn symbol(d: u8, last: bool) -> u16 {
    let d = d as u16;
    let nb3 = ((d & 0x20) == 0) as u16;
    let nb6 = ((d & 0x04) == 0) as u16;
    let top3 = (d >> 5) & 0x7;
    let mid3 = (d >> 2) & 0x7;
    let last2 = d & 0x3;
    let next = if last { SYNC_END } else { SYNC_MORE };

    (top3 << 9) | (nb3 << 8) | (mid3 << 5) | (nb6 << 4) | (last2 << 2) | next
}

/// Encode a frame for transmission
///
/// # Examples
///
/// ```
/// use enocean_gateway::enocean::decoder::get_frames;
/// use enocean_gateway::enocean::encoder::encode;
/// use enocean_gateway::enocean::frame::Frame;
///
/// let frame = Frame::from_bytes(hex::decode("a6a52b5434080580cc3aaabbccdd8032").unwrap())?;
/// let decoded = get_frames(&encode(&frame));
/// assert_eq!(decoded, vec![frame]);
/// # Ok::<(), enocean_gateway::error::EnoceanError>(())
/// ```
pub fn encode(frame: &Frame) -> Vec<u8> {
    let bytes = frame.as_bytes();
    let mut out = Vec::with_capacity(2 + bytes.len() * 3 / 2 + 1);
    out.push(PREAMBLE);

    // Pending bits, right aligned; never holds more than 4 + 12
    let mut carry: u32 = SYNC_NIBBLE as u32;
    let mut carry_bits: u32 = 4;

    for (i, &byte) in bytes.iter().enumerate() {
        let code = symbol(!byte, i + 1 == bytes.len());
        carry = (carry << 12) | code as u32;
        carry_bits += 12;

        while carry_bits >= 8 {
            carry_bits -= 8;
            out.push((carry >> carry_bits) as u8);
        }
        carry &= (1 << carry_bits) - 1;
    }

    if carry_bits > 0 {
        out.push((carry << (8 - carry_bits)) as u8);
    }

    out
}
