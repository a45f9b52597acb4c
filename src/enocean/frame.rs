//! # ERP1 Frame
//!
//! Validated byte container for one radio telegram:
//!
//! ```text
//! +------+-----------------+----------+--------+------+
//! | RORG | DATA[0..size-7] | TXID (4) | STATUS | HASH |
//! +------+-----------------+----------+--------+------+
//! ```
//!
//! STATUS bit 7 selects the integrity mechanism (1 = CRC-8, 0 = checksum),
//! bits 0-3 count repeater hops. The buffer is a shared [`Bytes`], so
//! cloning a frame never copies.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::crc::{checksum, crc8_erp1};
use super::protocol::*;
use crate::error::{EnoceanError, Result};

/// Integrity mechanism selected by the STATUS byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityMechanism {
    Checksum,
    Crc8,
}

/// One decoded or constructed radio telegram
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Wrap raw frame bytes, validating the size
    ///
    /// # Errors
    ///
    /// Returns `FrameSize` if the length is outside 7..=21 bytes
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < FRAME_MIN_SIZE || bytes.len() > FRAME_MAX_SIZE {
            return Err(EnoceanError::FrameSize {
                size: bytes.len(),
                min: FRAME_MIN_SIZE,
                max: FRAME_MAX_SIZE,
            });
        }
        Ok(Self { bytes })
    }

    /// Build a CRC-8 protected frame
    ///
    /// Appends the source TXID, `status | 0x80` and the CRC-8 over all
    /// preceding bytes. Frames built here always use CRC-8.
    ///
    /// # Errors
    ///
    /// Returns `FrameSize` if `data` is longer than 14 bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use enocean_gateway::enocean::frame::Frame;
    /// use enocean_gateway::enocean::protocol::Txid;
    ///
    /// let frame = Frame::new(0xA5, &[0x00, 0x80, 0x28, 0x28], Txid(0x0580CC3A), 0x00)?;
    /// assert_eq!(frame.to_string(), "a5008028280580cc3a80b9");
    /// assert!(frame.crc_ok());
    /// # Ok::<(), enocean_gateway::error::EnoceanError>(())
    /// ```
    pub fn new(rorg: u8, data: &[u8], source: Txid, status: u8) -> Result<Self> {
        let size = 1 + data.len() + FRAME_TRAILER_SIZE;
        if size > FRAME_MAX_SIZE {
            return Err(EnoceanError::FrameSize {
                size,
                min: FRAME_MIN_SIZE,
                max: FRAME_MAX_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(rorg);
        buf.put_slice(data);
        buf.put_u32(source.0);
        buf.put_u8(status | STATUS_CRC8_FLAG);
        let hash = crc8_erp1(&buf, false);
        buf.put_u8(hash);

        Ok(Self { bytes: buf.freeze() })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Telegram type discriminator
    pub fn rorg(&self) -> u8 {
        self.bytes[0]
    }

    /// RORG followed by the data field (everything before the TXID)
    pub fn payload(&self) -> &[u8] {
        &self.bytes[..self.size() - FRAME_TRAILER_SIZE]
    }

    /// Data field between RORG and TXID
    pub fn data(&self) -> &[u8] {
        &self.bytes[1..self.size() - FRAME_TRAILER_SIZE]
    }

    /// Transmitter ID (big-endian)
    pub fn txid(&self) -> Txid {
        let at = self.size() - FRAME_TRAILER_SIZE;
        Txid::from_bytes([
            self.bytes[at],
            self.bytes[at + 1],
            self.bytes[at + 2],
            self.bytes[at + 3],
        ])
    }

    pub fn status(&self) -> u8 {
        self.bytes[self.size() - 2]
    }

    pub fn hash(&self) -> u8 {
        self.bytes[self.size() - 1]
    }

    pub fn num_repeater_hops(&self) -> u8 {
        self.status() & STATUS_REPEATER_MASK
    }

    /// Integrity mechanism announced by the STATUS byte
    ///
    /// With `skip_last` the STATUS byte is the second to last (the frame
    /// still carries its hash); without it the last byte is read, for a
    /// copy whose hash was already stripped.
    pub fn integrity_mechanism(&self, skip_last: bool) -> IntegrityMechanism {
        let status = if skip_last {
            self.bytes[self.size() - 2]
        } else {
            self.bytes[self.size() - 1]
        };

        if status & STATUS_CRC8_FLAG != 0 {
            IntegrityMechanism::Crc8
        } else {
            IntegrityMechanism::Checksum
        }
    }

    /// Hash recomputed over every byte but the last
    pub fn expected_hash(&self) -> u8 {
        match self.integrity_mechanism(true) {
            IntegrityMechanism::Crc8 => crc8_erp1(&self.bytes, true),
            IntegrityMechanism::Checksum => checksum(&self.bytes, true),
        }
    }

    pub fn crc_ok(&self) -> bool {
        self.expected_hash() == self.hash()
    }

    /// Verify the hash, for callers that want an error instead of a flag
    pub fn verify(&self) -> Result<()> {
        let expected = self.expected_hash();
        if expected != self.hash() {
            return Err(EnoceanError::Integrity {
                expected,
                actual: self.hash(),
            });
        }
        Ok(())
    }

    /// Hex dump for logging, with a trailing `!` when the hash is wrong
    pub fn describe(&self) -> String {
        let mut text = hex::encode(&self.bytes);
        if !self.crc_ok() {
            text.push('!');
        }
        text
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.bytes))
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> Frame {
        Frame::from_bytes(hex::decode(text).unwrap()).unwrap()
    }

    #[test]
    fn test_size_limits() {
        for size in 0..30 {
            let result = Frame::from_bytes(vec![0u8; size]);
            assert_eq!(
                result.is_err(),
                size < FRAME_MIN_SIZE || size > FRAME_MAX_SIZE,
                "size {}",
                size
            );
        }
    }

    #[test]
    fn test_size_error_variant() {
        match Frame::from_bytes(vec![0u8; 3]) {
            Err(EnoceanError::FrameSize { size, .. }) => assert_eq!(size, 3),
            other => panic!("Expected FrameSize, got: {:?}", other),
        }
    }

    #[test]
    fn test_accessors() {
        let f = frame("a6a52b5434080580cc3aaabbccdd8032");
        assert_eq!(f.size(), 16);
        assert_eq!(f.rorg(), RORG_ADDRESSED);
        assert_eq!(f.data(), &hex::decode("a52b5434080580cc3a").unwrap()[..]);
        assert_eq!(f.payload()[0], RORG_ADDRESSED);
        assert_eq!(f.payload().len(), f.size() - FRAME_TRAILER_SIZE);
        assert_eq!(f.txid(), Txid(0xAABBCCDD));
        assert_eq!(f.status(), 0x80);
        assert_eq!(f.hash(), 0x32);
        assert_eq!(f.num_repeater_hops(), 0);
        assert!(f.crc_ok());
        assert!(f.verify().is_ok());
    }

    #[test]
    fn test_new_matches_capture() {
        let built = Frame::new(0xA5, &[0x00, 0x80, 0x28, 0x28], Txid(0x0580CC3A), 0x00).unwrap();
        assert_eq!(built, frame("a5008028280580cc3a80b9"));
    }

    #[test]
    fn test_hash_agrees_with_bit_serial_crc() {
        use crate::enocean::crc::crc8;

        for len in 1..=14u8 {
            let data: Vec<u8> = (0..len).map(|i| i.wrapping_mul(73) ^ 0x5A).collect();
            let f = Frame::new(0xA6, &data, Txid(0x0580CC3A), 0).unwrap();
            assert_eq!(f.hash(), crc8(f.as_bytes(), CRC8_POLYNOMIAL, true));
            assert_eq!(f.expected_hash(), f.hash());
        }
    }

    #[test]
    fn test_new_rejects_oversized_data() {
        assert!(Frame::new(0xA6, &[0u8; 14], Txid(1), 0).is_ok());
        assert!(Frame::new(0xA6, &[0u8; 15], Txid(1), 0).is_err());
    }

    #[test]
    fn test_new_forces_crc8_and_keeps_hops() {
        let f = Frame::new(0xA5, &[1, 2, 3, 4], Txid(0x01020304), 0x03).unwrap();
        assert_eq!(f.status(), 0x83);
        assert_eq!(f.num_repeater_hops(), 3);
        assert_eq!(f.integrity_mechanism(true), IntegrityMechanism::Crc8);
    }

    #[test]
    fn test_integrity_mechanism_reads_selected_byte() {
        // STATUS without the CRC flag, but a hash byte with bit 7 set
        let mut bytes = vec![0xA5, 0x01, 0x02, 0x03, 0x08, 0x01, 0x02, 0x03, 0x04, 0x00];
        let sum = checksum(&bytes, false);
        bytes.push(sum);
        let f = Frame::from_bytes(bytes).unwrap();

        assert_eq!(f.integrity_mechanism(true), IntegrityMechanism::Checksum);
        assert_eq!(
            f.integrity_mechanism(false),
            if sum & 0x80 != 0 { IntegrityMechanism::Crc8 } else { IntegrityMechanism::Checksum }
        );
        assert!(f.crc_ok());
    }

    #[test]
    fn test_checksum_frame() {
        let mut bytes = vec![0xA5, 0x10, 0x20, 0x30, 0x08, 0xDE, 0xAD, 0xBE, 0xEF, 0x00];
        let sum = checksum(&bytes, false);
        bytes.push(sum);
        let good = Frame::from_bytes(bytes.clone()).unwrap();
        assert!(good.crc_ok());

        bytes[2] ^= 0x01;
        let bad = Frame::from_bytes(bytes).unwrap();
        assert!(!bad.crc_ok());
        assert!(matches!(bad.verify(), Err(EnoceanError::Integrity { .. })));
    }

    #[test]
    fn test_describe_marks_bad_hash() {
        assert_eq!(frame("a5008028280580cc3a80b9").describe(), "a5008028280580cc3a80b9");
        assert_eq!(frame("a5008028280580cc3a80ba").describe(), "a5008028280580cc3a80ba!");
    }
}
