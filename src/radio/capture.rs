//! # Capture Line Protocol
//!
//! Text protocol spoken with the radio co-processor over serial:
//!
//! ```text
//! co-processor -> host:  RX <rssi dBm> <hex capture>\n
//! host -> co-processor:  TX <hex bitstream>\n
//! ```
//!
//! Any other line (boot banners, debug output) is skipped.

use bytes::BytesMut;
use tracing::debug;

use crate::error::{EnoceanError, Result};

/// Longest line accepted before the buffer is discarded
pub const MAX_LINE_LENGTH: usize = 1024;

/// One demodulated capture reported by the co-processor
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub rssi: f64,
    pub data: Vec<u8>,
}

impl Capture {
    /// Parse an `RX` line (without its terminator)
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("RX") {
            return Err(EnoceanError::Serial(format!("not a capture line: {:?}", line)));
        }
        let rssi = parts
            .next()
            .and_then(|r| r.parse::<f64>().ok())
            .ok_or_else(|| EnoceanError::Serial(format!("missing RSSI: {:?}", line)))?;
        let data = hex::decode(parts.next().unwrap_or(""))?;
        Ok(Self { rssi, data })
    }
}

/// Format an encoded bitstream as a `TX` line
pub fn format_transmit(encoded: &[u8]) -> String {
    format!("TX {}\n", hex::encode(encoded))
}

/// Accumulates serial bytes and yields complete captures
#[derive(Debug, Default)]
pub struct CaptureCodec {
    buffer: BytesMut,
}

impl CaptureCodec {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_LINE_LENGTH && !self.buffer.contains(&b'\n') {
            debug!("Discarding {} bytes without line terminator", self.buffer.len());
            self.buffer.clear();
        }
    }

    /// Next complete capture, skipping lines that are not captures
    pub fn decode(&mut self) -> Option<Capture> {
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(end + 1);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match Capture::parse(text) {
                Ok(capture) => return Some(capture),
                Err(e) => debug!("Skipping serial line: {}", e),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capture() {
        let capture = Capture::parse("RX -67.5 00ab2ed7").unwrap();
        assert_eq!(capture.rssi, -67.5);
        assert_eq!(capture.data, vec![0x00, 0xAB, 0x2E, 0xD7]);
    }

    #[test]
    fn test_parse_rejects_other_lines() {
        assert!(Capture::parse("boot ok").is_err());
        assert!(Capture::parse("RX").is_err());
        assert!(matches!(Capture::parse("RX -60 zz"), Err(EnoceanError::InvalidHex(_))));
    }

    #[test]
    fn test_codec_split_lines() {
        let mut codec = CaptureCodec::new();
        codec.push(b"RX -60 00a");
        assert_eq!(codec.decode(), None);
        codec.push(b"b\r\nbanner\nRX -70 ff\n");

        assert_eq!(codec.decode(), Some(Capture { rssi: -60.0, data: vec![0x00, 0xAB] }));
        assert_eq!(codec.decode(), Some(Capture { rssi: -70.0, data: vec![0xFF] }));
        assert_eq!(codec.decode(), None);
    }

    #[test]
    fn test_codec_discards_runaway_line() {
        let mut codec = CaptureCodec::new();
        codec.push(&[b'x'; MAX_LINE_LENGTH + 1]);
        codec.push(b"\nRX -50 01\n");
        assert_eq!(codec.decode(), Some(Capture { rssi: -50.0, data: vec![0x01] }));
    }

    #[test]
    fn test_format_transmit() {
        assert_eq!(format_transmit(&[0x55, 0x65, 0xD6]), "TX 5565d6\n");
    }
}
