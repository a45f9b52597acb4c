//! # ERP1 SYS_EX Fragments
//!
//! System exclusive messages are split over 16-byte C5 telegrams whose
//! nine data bytes start with `SEQ[1:0] IDX[5:0]`:
//!
//! ```text
//! IDX == 0: SEQ|IDX | LEN[8:0] MID[10:0] FN[11:0] | payload[0..4]
//! IDX  > 0: SEQ|IDX | payload[4 + 8*(IDX-1) ..][..8]
//! ```
//!
//! SEQ 0 is reserved; senders cycle through 1..=3.

use super::frame::Frame;
use super::protocol::*;
use crate::error::{EnoceanError, Result};

/// Payload bytes carried by the first fragment
pub const FIRST_FRAGMENT_PAYLOAD: usize = 4;

/// Payload bytes carried by every following fragment
pub const FRAGMENT_PAYLOAD: usize = 8;

/// Largest payload the 9-bit length field can announce
pub const MAX_PAYLOAD_LEN: usize = 0x1FF;

/// Highest fragment index the 6-bit IDX field can hold
pub const MAX_IDX: u8 = 0x3F;

/// One SYS_EX fragment
///
/// Owns its frame (a cheap clone) so fragments can be parked in the
/// reassembly store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysExErp1 {
    frame: Frame,
}

impl SysExErp1 {
    /// # Errors
    ///
    /// Returns `MalformedTelegram` unless the frame is a 16-byte C5 telegram
    pub fn new(frame: Frame) -> Result<Self> {
        if frame.rorg() != RORG_SYS_EX || frame.size() != FRAME_SYS_EX_SIZE {
            return Err(EnoceanError::malformed(format!(
                "not a SYS_EX telegram (rorg 0x{:02X}, {} bytes)",
                frame.rorg(),
                frame.size()
            )));
        }
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn txid(&self) -> Txid {
        self.frame.txid()
    }

    pub fn seq(&self) -> u8 {
        self.frame.data()[0] >> 6
    }

    pub fn idx(&self) -> u8 {
        self.frame.data()[0] & MAX_IDX
    }

    fn header(&self) -> Option<&[u8]> {
        if self.idx() == 0 {
            Some(&self.frame.data()[1..5])
        } else {
            None
        }
    }

    /// Total payload length announced by the first fragment
    pub fn length(&self) -> Option<usize> {
        self.header()
            .map(|h| ((h[0] as usize) << 1) | (h[1] >> 7) as usize)
    }

    pub fn manufacturer_id(&self) -> Option<u16> {
        self.header()
            .map(|h| (((h[1] & 0x7F) as u16) << 4) | (h[2] >> 4) as u16)
    }

    pub fn function(&self) -> Option<u16> {
        self.header()
            .map(|h| (((h[2] & 0x0F) as u16) << 8) | h[3] as u16)
    }

    /// Offset of this fragment's bytes in the reassembled payload
    pub fn payload_offset(&self) -> usize {
        match self.idx() {
            0 => 0,
            idx => FIRST_FRAGMENT_PAYLOAD + FRAGMENT_PAYLOAD * (idx as usize - 1),
        }
    }

    /// Payload bytes carried by this fragment, padding included
    pub fn fragment_payload(&self) -> &[u8] {
        let data = self.frame.data();
        if self.idx() == 0 {
            &data[5..9]
        } else {
            &data[1..9]
        }
    }

    /// Split a payload into SYS_EX fragment frames sent from `source`
    ///
    /// # Errors
    ///
    /// Returns `MalformedTelegram` if `seq` is outside 1..=3 or the payload
    /// does not fit the length and index fields
    pub fn fragments(
        source: Txid,
        seq: u8,
        manufacturer_id: u16,
        function: u16,
        payload: &[u8],
    ) -> Result<Vec<Frame>> {
        if seq == 0 || seq > 3 {
            return Err(EnoceanError::malformed(format!("invalid SYS_EX SEQ {}", seq)));
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(EnoceanError::malformed(format!(
                "SYS_EX payload too long ({} bytes)",
                payload.len()
            )));
        }

        let len = payload.len();
        let mid = manufacturer_id & 0x7FF;
        let function = function & 0xFFF;

        let mut first = [0u8; 9];
        first[0] = seq << 6;
        first[1] = (len >> 1) as u8;
        first[2] = (((len & 0x01) as u8) << 7) | (mid >> 4) as u8;
        first[3] = (((mid & 0x0F) as u8) << 4) | (function >> 8) as u8;
        first[4] = function as u8;
        let head = len.min(FIRST_FRAGMENT_PAYLOAD);
        first[5..5 + head].copy_from_slice(&payload[..head]);

        let mut frames = vec![Frame::new(RORG_SYS_EX, &first, source, 0)?];

        for (i, chunk) in payload[head..].chunks(FRAGMENT_PAYLOAD).enumerate() {
            let idx = i + 1;
            if idx > MAX_IDX as usize {
                return Err(EnoceanError::malformed("SYS_EX payload needs too many fragments"));
            }
            let mut data = [0u8; 9];
            data[0] = (seq << 6) | idx as u8;
            data[1..1 + chunk.len()].copy_from_slice(chunk);
            frames.push(Frame::new(RORG_SYS_EX, &data, source, 0)?);
        }

        Ok(frames)
    }
}
