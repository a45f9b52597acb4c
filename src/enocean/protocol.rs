//! # EnOcean Protocol Constants and Types
//!
//! Core radio-level definitions: telegram type discriminators (RORG),
//! frame size limits, transmitter IDs and equipment profiles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EnoceanError, Result};

/// 4-byte sensor telegram
pub const RORG_4BS: u8 = 0xA5;

/// Addressed telegram (wraps another telegram plus a destination ID)
pub const RORG_ADDRESSED: u8 = 0xA6;

/// System exclusive (ERP1 SYS_EX) fragment
pub const RORG_SYS_EX: u8 = 0xC5;

/// Smallest frame: RORG + TXID(4) + STATUS + HASH
pub const FRAME_MIN_SIZE: usize = 7;

/// Largest frame accepted by the PHY
pub const FRAME_MAX_SIZE: usize = 21;

/// Bytes following the data field: TXID(4) + STATUS + HASH
pub const FRAME_TRAILER_SIZE: usize = 6;

/// Size of an unaddressed 4BS frame
pub const FRAME_4BS_SIZE: usize = 11;

/// Size of an addressed 4BS frame (A6 + A5 + 4 data + destination)
pub const FRAME_ADDRESSED_4BS_SIZE: usize = 16;

/// Size of an ERP1 SYS_EX fragment frame
pub const FRAME_SYS_EX_SIZE: usize = 16;

/// STATUS bit selecting CRC-8 over the additive checksum
pub const STATUS_CRC8_FLAG: u8 = 0x80;

/// STATUS bits holding the repeater hop count
pub const STATUS_REPEATER_MASK: u8 = 0x0F;

/// CRC-8 polynomial used by ERP1 (x^8 + x^2 + x + 1)
pub const CRC8_POLYNOMIAL: u8 = 0x07;

/// Broadcast destination
pub const TXID_BROADCAST: Txid = Txid(0xFFFF_FFFF);

/// 32-bit transmitter identifier
///
/// Displays and serializes as 8 lowercase hex digits (e.g. `0580cc3a`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Txid(pub u32);

impl Txid {
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Txid(u32::from_be_bytes(bytes))
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for Txid {
    type Err = EnoceanError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim_start_matches("0x");
        u32::from_str_radix(s, 16)
            .map(Txid)
            .map_err(|_| EnoceanError::InvalidCommand(format!("invalid TXID: {}", s)))
    }
}

impl TryFrom<String> for Txid {
    type Error = EnoceanError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Txid> for String {
    fn from(txid: Txid) -> Self {
        txid.to_string()
    }
}

/// EnOcean Equipment Profile: `(RORG, FUNC, TYPE)`
///
/// Displays and serializes as `RR-FF-TT` (e.g. `A5-20-06`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Eep {
    pub rorg: u8,
    pub func: u8,
    pub kind: u8,
}

/// Battery-powered heating valve actuator
pub const EEP_A5_20_01: Eep = Eep::new(0xA5, 0x20, 0x01);

/// Energy-harvesting heating valve actuator with local offset
pub const EEP_A5_20_06: Eep = Eep::new(0xA5, 0x20, 0x06);

/// Central command gateway (default identity of this gateway)
pub const EEP_A5_38_08: Eep = Eep::new(0xA5, 0x38, 0x08);

impl Eep {
    pub const fn new(rorg: u8, func: u8, kind: u8) -> Self {
        Self { rorg, func, kind }
    }

    /// Packed 24-bit form `(rorg << 16) | (func << 8) | type`
    pub const fn packed(self) -> u32 {
        ((self.rorg as u32) << 16) | ((self.func as u32) << 8) | self.kind as u32
    }

    pub const fn from_packed(value: u32) -> Self {
        Self {
            rorg: (value >> 16) as u8,
            func: (value >> 8) as u8,
            kind: value as u8,
        }
    }
}

impl fmt::Display for Eep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}-{:02X}-{:02X}", self.rorg, self.func, self.kind)
    }
}

impl FromStr for Eep {
    type Err = EnoceanError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || EnoceanError::InvalidCommand(format!("invalid EEP: {}", s));
        let parts: Vec<&str> = s.split('-').collect();
        match parts.as_slice() {
            [rorg, func, kind] => {
                let byte = |p: &str| u8::from_str_radix(p, 16).map_err(|_| invalid());
                Ok(Eep::new(byte(rorg)?, byte(func)?, byte(kind)?))
            }
            [packed] => u32::from_str_radix(packed.trim_start_matches("0x"), 16)
                .ok()
                .filter(|v| *v <= 0xFF_FFFF)
                .map(Eep::from_packed)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Eep {
    type Error = EnoceanError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Eep> for String {
    fn from(eep: Eep) -> Self {
        eep.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(RORG_4BS, 0xA5);
        assert_eq!(RORG_ADDRESSED, 0xA6);
        assert_eq!(RORG_SYS_EX, 0xC5);
        assert_eq!(FRAME_MIN_SIZE, 1 + FRAME_TRAILER_SIZE);
        assert_eq!(FRAME_4BS_SIZE, FRAME_MIN_SIZE + 4);
    }

    #[test]
    fn test_txid_display_and_parse() {
        let txid = Txid(0x0580CC3A);
        assert_eq!(txid.to_string(), "0580cc3a");
        assert_eq!("0580cc3a".parse::<Txid>().unwrap(), txid);
        assert_eq!("0x0580CC3A".parse::<Txid>().unwrap(), txid);
        assert!("nothex".parse::<Txid>().is_err());
        assert_eq!(Txid::from_bytes(txid.to_bytes()), txid);
    }

    #[test]
    fn test_eep_packed() {
        assert_eq!(EEP_A5_20_06.packed(), 0xA52006);
        assert_eq!(Eep::from_packed(0xA52001), EEP_A5_20_01);
    }

    #[test]
    fn test_eep_parse() {
        assert_eq!("A5-20-06".parse::<Eep>().unwrap(), EEP_A5_20_06);
        assert_eq!("a52001".parse::<Eep>().unwrap(), EEP_A5_20_01);
        assert!("A5-20".parse::<Eep>().is_err());
        assert!("1000000".parse::<Eep>().is_err());
        assert_eq!(EEP_A5_38_08.to_string(), "A5-38-08");
    }

    #[test]
    fn test_serde_text_forms() {
        let json = serde_json::to_string(&(Txid(0xFF800000), EEP_A5_20_06)).unwrap();
        assert_eq!(json, r#"["ff800000","A5-20-06"]"#);

        let (txid, eep): (Txid, Eep) = serde_json::from_str(&json).unwrap();
        assert_eq!(txid, Txid(0xFF800000));
        assert_eq!(eep, EEP_A5_20_06);
    }
}
