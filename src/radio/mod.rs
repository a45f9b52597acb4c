//! # Radio Module
//!
//! Transmit path between the gateway and a radio driver.
//!
//! This module handles:
//! - The [`FrameSink`] seam the gateway sends frames through
//! - PHY encoding and jittered triple retransmission ([`Retransmitter`])
//! - The capture line protocol spoken by the radio co-processor
//! - Serial link management

pub mod capture;
pub mod link;
pub mod serial;

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::enocean::encoder;
use crate::enocean::frame::Frame;
use crate::error::Result;

/// Total length of one retransmission window
pub const TRANSMIT_WINDOW: Duration = Duration::from_millis(40);

/// Destination for frames leaving the gateway
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: &Frame) -> Result<()>;
}

/// Raw transmit capability of a radio driver
#[cfg_attr(test, mockall::automock)]
pub trait RadioSink: Send {
    /// Emit one encoded PHY bitstream
    fn transmit(&mut self, encoded: &[u8]) -> Result<()>;

    /// Return the radio to receive mode
    fn listen(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Send offsets within one [`TRANSMIT_WINDOW`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitSchedule {
    /// Pause after the first send, in [1, 9) ms
    pub second_delay: Duration,
    /// Start of the third send relative to the first, in [20, 39) ms
    pub third_offset: Duration,
}

impl TransmitSchedule {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            second_delay: Duration::from_micros(rng.gen_range(1_000..9_000)),
            third_offset: Duration::from_micros(rng.gen_range(20_000..39_000)),
        }
    }
}

fn sleep_until(deadline: Instant) {
    if let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        thread::sleep(remaining);
    }
}

/// Encodes frames and sends each one three times per window
///
/// The radio mutex is held for each send plus the switch back to receive,
/// never across the pauses in between.
pub struct Retransmitter<R> {
    radio: Mutex<R>,
    rng: Mutex<StdRng>,
}

impl<R: RadioSink> Retransmitter<R> {
    pub fn new(radio: R) -> Self {
        Self::with_rng(radio, StdRng::from_entropy())
    }

    pub fn with_rng(radio: R, rng: StdRng) -> Self {
        Self {
            radio: Mutex::new(radio),
            rng: Mutex::new(rng),
        }
    }

    fn send_once(&self, encoded: &[u8]) -> Result<()> {
        let mut radio = self.radio.lock().unwrap_or_else(|e| e.into_inner());
        radio.transmit(encoded)?;
        radio.listen()
    }

    /// Send `encoded` three times inside one [`TRANSMIT_WINDOW`]; blocks
    /// for the whole window
    pub fn transmit(&self, encoded: &[u8]) -> Result<()> {
        let schedule = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            TransmitSchedule::random(&mut *rng)
        };
        trace!("Transmit schedule {:?}", schedule);

        let start = Instant::now();
        self.send_once(encoded)?;
        thread::sleep(schedule.second_delay);
        self.send_once(encoded)?;
        sleep_until(start + schedule.third_offset);
        self.send_once(encoded)?;
        sleep_until(start + TRANSMIT_WINDOW);
        Ok(())
    }
}

impl<R: RadioSink> FrameSink for Retransmitter<R> {
    fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.transmit(&encoder::encode(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enocean::decoder::get_frames;
    use crate::enocean::protocol::Txid;
    use crate::error::EnoceanError;
    use mockall::Sequence;
    use std::sync::Arc;

    #[test]
    fn test_schedule_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let s = TransmitSchedule::random(&mut rng);
            assert!(s.second_delay >= Duration::from_millis(1));
            assert!(s.second_delay < Duration::from_millis(9));
            assert!(s.third_offset >= Duration::from_millis(20));
            assert!(s.third_offset < Duration::from_millis(39));
            assert!(s.third_offset < TRANSMIT_WINDOW);
        }
    }

    #[test]
    fn test_schedule_is_seeded() {
        let a = TransmitSchedule::random(&mut StdRng::seed_from_u64(42));
        let b = TransmitSchedule::random(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_three_sends_per_frame() {
        let frame = Frame::new(0xA5, &[0x00, 0x80, 0x28, 0x28], Txid(0x0580CC3A), 0).unwrap();
        let expected = encoder::encode(&frame);

        let mut radio = MockRadioSink::new();
        let mut seq = Sequence::new();
        for _ in 0..3 {
            let expected = expected.clone();
            radio
                .expect_transmit()
                .withf(move |data: &[u8]| data == expected.as_slice())
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
            radio.expect_listen().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        }

        let retransmitter = Retransmitter::with_rng(radio, StdRng::seed_from_u64(1));
        let start = Instant::now();
        retransmitter.send_frame(&frame).unwrap();
        assert!(start.elapsed() >= TRANSMIT_WINDOW);
    }

    #[test]
    fn test_encoded_bitstream_decodes() {
        let frame = Frame::new(0xA5, &[0x2B, 0x54, 0x34, 0x08], Txid(0xAABBCCDD), 0).unwrap();
        let sent = Arc::new(Mutex::new(Vec::new()));

        let mut radio = MockRadioSink::new();
        let sink = Arc::clone(&sent);
        radio.expect_transmit().returning(move |data| {
            sink.lock().unwrap().push(data.to_vec());
            Ok(())
        });
        radio.expect_listen().returning(|| Ok(()));

        Retransmitter::with_rng(radio, StdRng::seed_from_u64(3)).send_frame(&frame).unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(get_frames(&sent[0]), vec![frame]);
    }

    #[test]
    fn test_transmit_error_stops_burst() {
        let mut radio = MockRadioSink::new();
        radio
            .expect_transmit()
            .times(1)
            .returning(|_| Err(EnoceanError::Serial("link down".to_string())));
        radio.expect_listen().never();

        let retransmitter = Retransmitter::with_rng(radio, StdRng::seed_from_u64(5));
        assert!(retransmitter.transmit(&[0x55]).is_err());
    }
}
