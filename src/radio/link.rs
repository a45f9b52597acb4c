//! Line-oriented write side of the radio link
//!
//! The co-processor takes one command per newline-terminated line. The
//! serial writer only ever talks to a [`LineSink`], so it runs against a
//! recording sink in tests.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{EnoceanError, Result};

#[async_trait]
pub trait LineSink: Send {
    /// Write one complete line and push it out to the device
    async fn send_line(&mut self, line: &str) -> Result<()>;
}

/// [`LineSink`] over any tokio writer, usually the write half of a
/// `SerialStream`
pub struct SerialLine<W> {
    writer: W,
}

impl<W> SerialLine<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> LineSink for SerialLine<W> {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| EnoceanError::Serial(format!("Failed to write: {}", e)))?;
        // The co-processor only acts on a line once it has all of it
        self.writer
            .flush()
            .await
            .map_err(|e| EnoceanError::Serial(format!("Failed to flush serial port: {}", e)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serial_line_writes_whole_line() {
        let mut link = SerialLine::new(Vec::new());
        link.send_line("TX 55\n").await.unwrap();
        link.send_line("TX d6\n").await.unwrap();
        assert_eq!(link.into_inner(), b"TX 55\nTX d6\n");
    }

    #[tokio::test]
    async fn test_serial_line_reports_write_failure() {
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            .build();
        let mut link = SerialLine::new(writer);
        match link.send_line("TX 55\n").await {
            Err(EnoceanError::Serial(msg)) => assert!(msg.starts_with("Failed to write")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }
}
