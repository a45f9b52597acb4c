//! # Serial Radio Link
//!
//! Connection to the radio co-processor over a USB serial port.
//!
//! This module handles:
//! - Opening the port (auto-detecting among common device paths)
//! - Reading `RX` capture lines into [`Capture`]s
//! - Writing queued `TX` lines for the retransmitter
//!
//! The retransmitter runs on blocking threads, so it hands encoded
//! bitstreams to [`ChannelRadio`], which queues them for the async writer.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use super::capture::{format_transmit, Capture, CaptureCodec};
use super::link::LineSink;
use super::RadioSink;
use crate::config::SerialConfig;
use crate::error::{EnoceanError, Result};

/// Default device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Serial port handle for the radio co-processor
pub struct RadioSerial {
    port: tokio_serial::SerialStream,
    device_path: String,
}

impl std::fmt::Debug for RadioSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl RadioSerial {
    /// Open the configured port, falling back to the default paths
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let mut paths = vec![config.port.as_str()];
        paths.extend(DEFAULT_DEVICE_PATHS.iter().filter(|p| **p != config.port));
        Self::open_with_paths(&paths, config.baud_rate, Duration::from_millis(config.timeout_ms))
    }

    /// Open the first of `paths` that succeeds
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` listing every path tried
    pub fn open_with_paths(paths: &[&str], baud_rate: u32, timeout: Duration) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate, timeout) {
                Ok(port) => {
                    info!("Opened radio co-processor at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                }
            }
        }

        Err(EnoceanError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32, timeout: Duration) -> Result<tokio_serial::SerialStream> {
        tokio_serial::new(path, baud_rate)
            .timeout(timeout)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| EnoceanError::Serial(format!("Failed to open {}: {}", path, e)))
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Split into independent read and write halves
    pub fn into_split(
        self,
    ) -> (
        tokio::io::ReadHalf<tokio_serial::SerialStream>,
        tokio::io::WriteHalf<tokio_serial::SerialStream>,
    ) {
        tokio::io::split(self.port)
    }
}

/// [`RadioSink`] that queues encoded bitstreams for [`run_writer`]
#[derive(Debug, Clone)]
pub struct ChannelRadio {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelRadio {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RadioSink for ChannelRadio {
    fn transmit(&mut self, encoded: &[u8]) -> Result<()> {
        self.tx
            .send(encoded.to_vec())
            .map_err(|_| EnoceanError::Serial("serial writer stopped".to_string()))
    }
}

/// Write queued bitstreams as `TX` lines until the queue closes
pub async fn run_writer<L: LineSink>(
    link: &mut L,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) -> Result<()> {
    while let Some(encoded) = rx.recv().await {
        link.send_line(&format_transmit(&encoded)).await?;
        debug!("Sent bitstream ({} bytes)", encoded.len());
    }
    Ok(())
}

/// Forward captures read from `reader` until EOF or the receiver goes away
pub async fn run_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    captures: mpsc::Sender<Capture>,
) -> Result<()> {
    let mut codec = CaptureCodec::new();
    let mut buf = [0u8; 256];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            info!("Serial link closed");
            return Ok(());
        }
        codec.push(&buf[..n]);
        while let Some(capture) = codec.decode() {
            if captures.send(capture).await.is_err() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::link::mocks::RecordingLine;

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = RadioSerial::open_with_paths(invalid_paths, 57600, Duration::from_millis(100));

        match result.unwrap_err() {
            EnoceanError::SerialPortNotFound(msg) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = RadioSerial::open_port("/dev/nonexistent_serial_device_12345", 57600, Duration::from_millis(100));
        match result.unwrap_err() {
            EnoceanError::Serial(msg) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_prefers_configured_port() {
        let config = SerialConfig {
            port: "/dev/nonexistent_radio".to_string(),
            baud_rate: 57600,
            timeout_ms: 100,
        };
        match RadioSerial::open(&config) {
            Ok(serial) => assert_ne!(serial.device_path(), "/dev/nonexistent_radio"),
            Err(EnoceanError::SerialPortNotFound(msg)) => {
                assert!(msg.starts_with("/dev/nonexistent_radio, /dev/ttyACM0"));
            }
            Err(other) => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_writer_formats_lines() {
        let (mut radio, rx) = ChannelRadio::channel();
        radio.transmit(&[0x55, 0x65]).unwrap();
        radio.transmit(&[0xD6]).unwrap();
        drop(radio);

        let mut link = RecordingLine::default();
        run_writer(&mut link, rx).await.unwrap();

        assert_eq!(link.lines, vec!["TX 5565\n", "TX d6\n"]);
    }

    #[tokio::test]
    async fn test_writer_propagates_write_error() {
        let (mut radio, rx) = ChannelRadio::channel();
        radio.transmit(&[0x55]).unwrap();
        drop(radio);

        let mut link = RecordingLine {
            fail_with: Some(std::io::ErrorKind::BrokenPipe),
            ..RecordingLine::default()
        };
        assert!(matches!(run_writer(&mut link, rx).await, Err(EnoceanError::Serial(_))));
    }

    #[test]
    fn test_transmit_after_writer_stopped() {
        let (mut radio, rx) = ChannelRadio::channel();
        drop(rx);
        assert!(radio.transmit(&[0x55]).is_err());
    }

    #[tokio::test]
    async fn test_reader_forwards_captures() {
        let reader = tokio_test::io::Builder::new()
            .read(b"boot\nRX -61 00ab")
            .read(b"2e\nRX -70 ff\n")
            .build();
        let (tx, mut rx) = mpsc::channel(8);

        run_reader(reader, tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(Capture { rssi: -61.0, data: vec![0x00, 0xAB, 0x2E] }));
        assert_eq!(rx.recv().await, Some(Capture { rssi: -70.0, data: vec![0xFF] }));
        assert_eq!(rx.recv().await, None);
    }
}
