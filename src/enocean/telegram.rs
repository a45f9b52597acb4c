//! # Telegram Views
//!
//! Typed interpretations of a [`Frame`]'s data field. Views borrow the
//! frame and re-read their fields on every accessor call; only the
//! constructors that build outgoing telegrams allocate.
//!
//! 4BS data bytes are named DB3..DB0 in transmission order:
//!
//! ```text
//! unaddressed: A5 | DB3 DB2 DB1 DB0 | TXID | STATUS | HASH
//! addressed:   A6 | A5 | DB3 DB2 DB1 DB0 | DEST | TXID | STATUS | HASH
//! ```

use super::frame::Frame;
use super::protocol::*;
use crate::error::{EnoceanError, Result};

/// DB0 bit that is cleared in teach-in telegrams
const LRN_BIT: u8 = 0x08;

/// 4-byte sensor telegram, addressed or not
#[derive(Debug, Clone, Copy)]
pub struct Telegram4BS<'a> {
    frame: &'a Frame,
    addressed: bool,
}

impl<'a> Telegram4BS<'a> {
    /// # Errors
    ///
    /// Returns `MalformedTelegram` unless the frame is an 11-byte A5
    /// telegram or a 16-byte A6 telegram wrapping one
    pub fn new(frame: &'a Frame) -> Result<Self> {
        match (frame.rorg(), frame.size()) {
            (RORG_4BS, FRAME_4BS_SIZE) => Ok(Self { frame, addressed: false }),
            (RORG_ADDRESSED, FRAME_ADDRESSED_4BS_SIZE) if frame.data()[0] == RORG_4BS => {
                Ok(Self { frame, addressed: true })
            }
            (rorg, size) => Err(EnoceanError::malformed(format!(
                "not a 4BS telegram (rorg 0x{:02X}, {} bytes)",
                rorg, size
            ))),
        }
    }

    pub fn frame(&self) -> &'a Frame {
        self.frame
    }

    pub fn is_addressed(&self) -> bool {
        self.addressed
    }

    /// DB3..DB0
    pub fn data(&self) -> &'a [u8] {
        let data = self.frame.data();
        if self.addressed {
            &data[1..5]
        } else {
            data
        }
    }

    pub fn db3(&self) -> u8 {
        self.data()[0]
    }

    pub fn db2(&self) -> u8 {
        self.data()[1]
    }

    pub fn db1(&self) -> u8 {
        self.data()[2]
    }

    pub fn db0(&self) -> u8 {
        self.data()[3]
    }

    pub fn txid(&self) -> Txid {
        self.frame.txid()
    }

    /// Destination of an addressed telegram
    pub fn destination(&self) -> Option<Txid> {
        if self.addressed {
            let d = &self.frame.data()[5..9];
            Some(Txid::from_bytes([d[0], d[1], d[2], d[3]]))
        } else {
            None
        }
    }

    pub fn is_teach_in(&self) -> bool {
        self.db0() & LRN_BIT == 0
    }
}

/// Teach-in flags carried in DB0 of a variation 3 learn telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LearnFlags {
    /// Bit 7: telegram carries EEP and manufacturer ID
    pub with_eep: bool,
    /// Bit 6: EEP supported (responses only)
    pub eep_supported: bool,
    /// Bit 5: teach-in succeeded (responses only)
    pub result: bool,
    /// Bit 4: response rather than query
    pub response: bool,
}

impl LearnFlags {
    fn to_db0(self) -> u8 {
        ((self.with_eep as u8) << 7)
            | ((self.eep_supported as u8) << 6)
            | ((self.result as u8) << 5)
            | ((self.response as u8) << 4)
    }
}

/// 4BS teach-in telegram, variation 3 (EEP + manufacturer ID)
///
/// ```text
/// DB3: FUNC[5:0] TYPE[6:5]
/// DB2: TYPE[4:0] MID[10:8]
/// DB1: MID[7:0]
/// DB0: LRN_TYPE EEP_RESULT LRN_RESULT LRN_STATUS LRN_BIT 0 0 0
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TelegramLearn4BS3<'a> {
    telegram: Telegram4BS<'a>,
}

impl<'a> TelegramLearn4BS3<'a> {
    /// # Errors
    ///
    /// Returns `MalformedTelegram` if the frame is not a 4BS teach-in
    pub fn new(frame: &'a Frame) -> Result<Self> {
        let telegram = Telegram4BS::new(frame)?;
        if !telegram.is_teach_in() {
            return Err(EnoceanError::malformed("4BS telegram is not a teach-in"));
        }
        Ok(Self { telegram })
    }

    pub fn telegram(&self) -> &Telegram4BS<'a> {
        &self.telegram
    }

    pub fn func(&self) -> u8 {
        self.telegram.db3() >> 2
    }

    pub fn kind(&self) -> u8 {
        ((self.telegram.db3() & 0x03) << 5) | (self.telegram.db2() >> 3)
    }

    pub fn manufacturer_id(&self) -> u16 {
        (((self.telegram.db2() & 0x07) as u16) << 8) | self.telegram.db1() as u16
    }

    pub fn learn_type_with_eep(&self) -> bool {
        self.telegram.db0() & 0x80 != 0
    }

    pub fn learn_eep_supported(&self) -> bool {
        self.telegram.db0() & 0x40 != 0
    }

    pub fn learn_result(&self) -> bool {
        self.telegram.db0() & 0x20 != 0
    }

    /// `true` for a response, `false` for a query
    pub fn learn_status(&self) -> bool {
        self.telegram.db0() & 0x10 != 0
    }

    pub fn learn_bit(&self) -> bool {
        self.telegram.db0() & LRN_BIT != 0
    }

    pub fn eep(&self) -> Eep {
        Eep::new(RORG_4BS, self.func(), self.kind())
    }

    /// Pack EEP, manufacturer ID and flags into DB3..DB0
    pub fn pack(eep: Eep, manufacturer_id: u16, flags: LearnFlags) -> [u8; 4] {
        let func = eep.func & 0x3F;
        let kind = eep.kind & 0x7F;
        let mid = manufacturer_id & 0x7FF;
        [
            (func << 2) | (kind >> 5),
            ((kind & 0x1F) << 3) | (mid >> 8) as u8,
            mid as u8,
            flags.to_db0(),
        ]
    }

    /// Unaddressed teach-in query, as sent by a device
    pub fn request(source: Txid, eep: Eep, manufacturer_id: u16) -> Result<Frame> {
        let flags = LearnFlags { with_eep: true, ..LearnFlags::default() };
        Frame::new(RORG_4BS, &Self::pack(eep, manufacturer_id, flags), source, 0)
    }

    /// Teach-in response addressed to `destination`
    pub fn response(
        source: Txid,
        destination: Txid,
        eep: Eep,
        manufacturer_id: u16,
        eep_supported: bool,
    ) -> Result<Frame> {
        let flags = LearnFlags {
            with_eep: true,
            eep_supported,
            result: eep_supported,
            response: true,
        };
        let frame = Frame::new(RORG_4BS, &Self::pack(eep, manufacturer_id, flags), source, 0)?;
        AddressedTelegram::wrap(&frame, destination)
    }
}

/// Telegram wrapped with a destination ID (RORG 0xA6)
///
/// ```text
/// A6 | inner RORG | inner DATA | DEST | TXID | STATUS | HASH
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AddressedTelegram<'a> {
    frame: &'a Frame,
}

impl<'a> AddressedTelegram<'a> {
    /// # Errors
    ///
    /// Returns `MalformedTelegram` unless the frame is an A6 telegram with
    /// room for an inner RORG and a destination
    pub fn new(frame: &'a Frame) -> Result<Self> {
        if frame.rorg() != RORG_ADDRESSED {
            return Err(EnoceanError::malformed(format!(
                "not an addressed telegram (rorg 0x{:02X})",
                frame.rorg()
            )));
        }
        if frame.data().len() < 1 + 4 {
            return Err(EnoceanError::malformed(format!(
                "addressed telegram too short ({} bytes)",
                frame.size()
            )));
        }
        Ok(Self { frame })
    }

    pub fn destination(&self) -> Txid {
        let data = self.frame.data();
        let d = &data[data.len() - 4..];
        Txid::from_bytes([d[0], d[1], d[2], d[3]])
    }

    pub fn inner_rorg(&self) -> u8 {
        self.frame.data()[0]
    }

    pub fn inner_data(&self) -> &'a [u8] {
        let data = self.frame.data();
        &data[1..data.len() - 4]
    }

    /// Rebuild the wrapped telegram as a standalone frame from the same sender
    pub fn inner(&self) -> Result<Frame> {
        Frame::new(
            self.inner_rorg(),
            self.inner_data(),
            self.frame.txid(),
            self.frame.status(),
        )
    }

    /// Re-frame `source` as an addressed telegram to `destination`
    ///
    /// Drops the source's TXID, STATUS and HASH, appends the destination
    /// and frames the result under the source's TXID.
    ///
    /// # Errors
    ///
    /// Returns `FrameSize` if the wrapped telegram no longer fits
    pub fn wrap(source: &Frame, destination: Txid) -> Result<Frame> {
        let mut data = Vec::with_capacity(source.payload().len() + 4);
        data.extend_from_slice(source.payload());
        data.extend_from_slice(&destination.to_bytes());
        Frame::new(RORG_ADDRESSED, &data, source.txid(), source.status())
    }
}
