//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! The `[gateway]` section only seeds a fresh gateway. Once the JSON state
//! file exists, its identity and mode flags take precedence.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::enocean::protocol::{Eep, Txid, EEP_A5_38_08};
use crate::error::{EnoceanError, Result};
use crate::gateway::GatewayConfiguration;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

/// Serial link to the radio co-processor
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Gateway identity and modes
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_state_file")]
    pub state_file: String,

    #[serde(default = "default_txid")]
    pub txid: Txid,

    #[serde(default = "default_manufacturer_id")]
    pub manufacturer_id: u16,

    #[serde(default = "default_eep")]
    pub eep: Eep,

    #[serde(default)]
    pub learning: bool,

    #[serde(default = "default_acting")]
    pub acting: bool,

    /// Partial SYS_EX messages never expire when unset
    #[serde(default)]
    pub reassembly_timeout_ms: Option<u64>,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 57600 }
fn default_timeout_ms() -> u64 { 100 }

fn default_state_file() -> String { "./gateway.json".to_string() }
fn default_txid() -> Txid { Txid(0xFF80_0000) }
fn default_manufacturer_id() -> u16 { 0x7FF }
fn default_eep() -> Eep { EEP_A5_38_08 }
fn default_acting() -> bool { true }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_log_level() -> String { "info".to_string() }

const BAUD_RATES: [u32; 5] = [9600, 57600, 115200, 230400, 460800];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn invalid(message: impl std::fmt::Display) -> EnoceanError {
    EnoceanError::Config(toml::de::Error::custom(message))
}

impl GatewayConfig {
    /// Gateway state used when no state file exists yet
    pub fn seed(&self) -> GatewayConfiguration {
        GatewayConfiguration {
            txid: self.txid,
            manufacturer_id: self.manufacturer_id,
            eep: self.eep,
            acting: self.acting,
            learning: self.learning,
            ..GatewayConfiguration::default()
        }
    }

    pub fn reassembly_timeout(&self) -> Option<Duration> {
        self.reassembly_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use enocean_gateway::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 57600, 115200, 230400, 460800"));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.gateway.state_file.is_empty() {
            return Err(invalid("gateway state_file cannot be empty"));
        }

        if self.gateway.manufacturer_id > 0x7FF {
            return Err(invalid("manufacturer_id must fit in 11 bits (0..=0x7FF)"));
        }

        if self.gateway.reassembly_timeout_ms == Some(0) {
            return Err(invalid("reassembly_timeout_ms must be greater than 0 when set"));
        }

        if self.logging.file_enabled && self.logging.log_dir.is_empty() {
            return Err(invalid("logging log_dir cannot be empty when file logging is enabled"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "log level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> Config {
        Config {
            serial: SerialConfig {
                port: default_serial_port(),
                baud_rate: default_baud_rate(),
                timeout_ms: default_timeout_ms(),
            },
            gateway: GatewayConfig {
                state_file: default_state_file(),
                txid: default_txid(),
                manufacturer_id: default_manufacturer_id(),
                eep: default_eep(),
                learning: false,
                acting: default_acting(),
                reassembly_timeout_ms: None,
            },
            logging: LoggingConfig {
                file_enabled: false,
                log_dir: default_log_dir(),
                level: default_log_level(),
            },
        }
    }

    #[test]
    fn test_default_config() {
        let config = create_valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.txid, Txid(0xFF800000));
        assert_eq!(config.gateway.eep.to_string(), "A5-38-08");
    }

    #[test]
    fn test_empty_port_rejected() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());

        config.serial.baud_rate = 115200;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = create_valid_config();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());

        config.serial.timeout_ms = 10001;
        assert!(config.validate().is_err());

        config.serial.timeout_ms = 10000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_manufacturer_id_range() {
        let mut config = create_valid_config();
        config.gateway.manufacturer_id = 0x800;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_reassembly_timeout_rejected() {
        let mut config = create_valid_config();
        config.gateway.reassembly_timeout_ms = Some(0);
        assert!(config.validate().is_err());

        config.gateway.reassembly_timeout_ms = Some(2000);
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.reassembly_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_log_dir_required_when_enabled() {
        let mut config = create_valid_config();
        config.logging.file_enabled = true;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_valid_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seed_copies_identity() {
        let mut config = create_valid_config();
        config.gateway.learning = true;
        let seed = config.gateway.seed();
        assert_eq!(seed.txid, Txid(0xFF800000));
        assert_eq!(seed.manufacturer_id, 0x7FF);
        assert!(seed.learning);
        assert!(seed.acting);
        assert!(seed.devices.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[serial]
port = "/dev/ttyUSB1"
baud_rate = 115200

[gateway]
txid = "ff8000a0"
eep = "A5-38-08"
learning = true
reassembly_timeout_ms = 5000

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.timeout_ms, 100);
        assert_eq!(config.gateway.txid, Txid(0xFF8000A0));
        assert!(config.gateway.learning);
        assert_eq!(config.gateway.reassembly_timeout(), Some(Duration::from_millis(5000)));
        assert!(!config.logging.file_enabled);
    }

    #[test]
    fn test_load_rejects_bad_txid() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[serial]\n[gateway]\ntxid = \"not-hex\"\n[logging]\n").unwrap();
        assert!(matches!(Config::load(file.path()), Err(EnoceanError::Config(_))));
    }

    #[test]
    fn test_load_shipped_default() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.gateway.eep, EEP_A5_38_08);
    }
}
