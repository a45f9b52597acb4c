//! # Error Types
//!
//! Custom error types for the EnOcean gateway using `thiserror`.

use thiserror::Error;

use crate::enocean::protocol::{Eep, Txid};

/// Main error type for the EnOcean gateway
#[derive(Debug, Error)]
pub enum EnoceanError {
    /// Frame byte count outside the valid range
    #[error("Frame size error: {size} bytes (must be {min}..={max})")]
    FrameSize {
        size: usize,
        min: usize,
        max: usize,
    },

    /// CRC-8 or checksum mismatch
    #[error("Integrity error: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Integrity { expected: u8, actual: u8 },

    /// Telegram from a transmitter that was never taught in
    #[error("Unknown device: {0}")]
    UnknownDevice(Txid),

    /// Equipment profile without a codec
    #[error("Unsupported EEP: {0}")]
    UnsupportedEep(Eep),

    /// SYS_EX sequence counter discontinuity
    #[error("Sequence error: expected SEQ {expected}, got {got}")]
    Sequence { expected: u8, got: u8 },

    /// Wrong RORG or size for the requested telegram view
    #[error("Malformed telegram: {0}")]
    MalformedTelegram(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Gateway state file errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial link errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Hex text that does not decode to bytes
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Console command that could not be parsed
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl EnoceanError {
    /// Create a malformed telegram error.
    pub fn malformed(message: impl Into<String>) -> Self {
        EnoceanError::MalformedTelegram(message.into())
    }
}

/// Result type alias for the EnOcean gateway
pub type Result<T> = std::result::Result<T, EnoceanError>;
