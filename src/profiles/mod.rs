//! # Device Profiles Module
//!
//! Per-EEP codecs and the device registry entries built on them.
//!
//! This module handles:
//! - Decoding actuator status telegrams into typed reports
//! - Operator configuration and the update telegrams it produces
//! - Falling back to an `Unsupported` variant for unknown EEPs
//!
//! Device entries persist as `{eep, manufacturer_id, <configuration fields>}`.

pub mod a5_20_01;
pub mod a5_20_06;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::enocean::frame::Frame;
use crate::enocean::protocol::{Eep, Txid, EEP_A5_20_01, EEP_A5_20_06};
use crate::error::{EnoceanError, Result};

pub use a5_20_01::{A52001Configuration, A52001Report, A52001State, A52001Telegram};
pub use a5_20_06::{A52006Configuration, A52006Report, A52006State, A52006Telegram};

/// What the DB3 setpoint field carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetpointSelection {
    ValvePosition,
    Temperature,
}

/// Which sensor a reported temperature comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureSelection {
    Ambient,
    Feed,
}

/// Whether an EEP has a codec
pub fn is_supported(eep: Eep) -> bool {
    eep == EEP_A5_20_01 || eep == EEP_A5_20_06
}

/// Runtime state of a device, never persisted
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceState {
    A52001(A52001State),
    A52006(A52006State),
    Unsupported,
}

impl DeviceState {
    pub fn for_eep(eep: Eep) -> Self {
        match eep {
            EEP_A5_20_01 => DeviceState::A52001(A52001State::default()),
            EEP_A5_20_06 => DeviceState::A52006(A52006State::default()),
            _ => DeviceState::Unsupported,
        }
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        match self {
            DeviceState::A52001(s) => s.last_seen,
            DeviceState::A52006(s) => s.last_seen,
            DeviceState::Unsupported => None,
        }
    }

    pub fn rssi(&self) -> Option<f64> {
        match self {
            DeviceState::A52001(s) => s.rssi,
            DeviceState::A52006(s) => s.rssi,
            DeviceState::Unsupported => None,
        }
    }
}

/// Operator-editable configuration of a device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceConfiguration {
    A52001(A52001Configuration),
    A52006(A52006Configuration),
    Unsupported(Eep),
}

impl DeviceConfiguration {
    pub fn for_eep(eep: Eep) -> Self {
        match eep {
            EEP_A5_20_01 => DeviceConfiguration::A52001(A52001Configuration::default()),
            EEP_A5_20_06 => DeviceConfiguration::A52006(A52006Configuration::default()),
            other => DeviceConfiguration::Unsupported(other),
        }
    }

    pub fn dirty(&self) -> bool {
        match self {
            DeviceConfiguration::A52001(c) => c.dirty,
            DeviceConfiguration::A52006(c) => c.dirty,
            DeviceConfiguration::Unsupported(_) => false,
        }
    }

    pub fn setpoint_selection(&self) -> Option<SetpointSelection> {
        match self {
            DeviceConfiguration::A52001(c) => Some(c.setpoint_selection),
            DeviceConfiguration::A52006(c) => Some(c.setpoint_selection),
            DeviceConfiguration::Unsupported(_) => None,
        }
    }

    /// Operator write of a temperature setpoint; marks the configuration dirty
    pub fn set_setpoint(&mut self, celsius: f32) -> Result<()> {
        match self {
            DeviceConfiguration::A52001(c) => {
                c.setpoint = celsius;
                c.dirty = true;
            }
            DeviceConfiguration::A52006(c) => {
                c.setpoint = celsius;
                c.dirty = true;
            }
            DeviceConfiguration::Unsupported(eep) => return Err(EnoceanError::UnsupportedEep(*eep)),
        }
        Ok(())
    }

    pub fn mk_update(&self, source: Txid, destination: Txid, status: u8) -> Result<Frame> {
        match self {
            DeviceConfiguration::A52001(c) => c.mk_update(source, destination, status),
            DeviceConfiguration::A52006(c) => c.mk_update(source, destination, status),
            DeviceConfiguration::Unsupported(eep) => Err(EnoceanError::UnsupportedEep(*eep)),
        }
    }

    fn to_fields(&self) -> Result<Map<String, Value>> {
        let value = match self {
            DeviceConfiguration::A52001(c) => serde_json::to_value(c)?,
            DeviceConfiguration::A52006(c) => serde_json::to_value(c)?,
            DeviceConfiguration::Unsupported(_) => return Ok(Map::new()),
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    fn from_fields(eep: Eep, fields: Map<String, Value>) -> Result<Self> {
        Ok(match eep {
            EEP_A5_20_01 => DeviceConfiguration::A52001(serde_json::from_value(Value::Object(fields))?),
            EEP_A5_20_06 => DeviceConfiguration::A52006(serde_json::from_value(Value::Object(fields))?),
            other => DeviceConfiguration::Unsupported(other),
        })
    }
}

/// One learned transmitter
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub eep: Eep,
    pub manufacturer_id: u16,
    pub state: DeviceState,
    pub configuration: DeviceConfiguration,
}

impl Device {
    pub fn new(eep: Eep, manufacturer_id: u16) -> Self {
        Self {
            eep,
            manufacturer_id,
            state: DeviceState::for_eep(eep),
            configuration: DeviceConfiguration::for_eep(eep),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DeviceRecord {
    eep: Eep,
    manufacturer_id: u16,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Serialize for Device {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = self.configuration.to_fields().map_err(S::Error::custom)?;
        DeviceRecord {
            eep: self.eep,
            manufacturer_id: self.manufacturer_id,
            fields,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Device {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let record = DeviceRecord::deserialize(deserializer)?;
        let configuration =
            DeviceConfiguration::from_fields(record.eep, record.fields).map_err(D::Error::custom)?;
        Ok(Device {
            eep: record.eep,
            manufacturer_id: record.manufacturer_id,
            state: DeviceState::for_eep(record.eep),
            configuration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_follow_eep() {
        let device = Device::new(EEP_A5_20_06, 0x049);
        assert!(matches!(device.state, DeviceState::A52006(_)));
        assert!(matches!(device.configuration, DeviceConfiguration::A52006(_)));

        let other = Eep::new(0xD2, 0x01, 0x01);
        let device = Device::new(other, 0x00B);
        assert_eq!(device.state, DeviceState::Unsupported);
        assert_eq!(device.configuration, DeviceConfiguration::Unsupported(other));
        assert!(!is_supported(other));
    }

    #[test]
    fn test_set_setpoint_marks_dirty() {
        let mut configuration = DeviceConfiguration::for_eep(EEP_A5_20_01);
        configuration.set_setpoint(22.5).unwrap();
        assert!(configuration.dirty());

        let mut unsupported = DeviceConfiguration::Unsupported(Eep::new(0xF6, 0x02, 0x01));
        assert!(matches!(unsupported.set_setpoint(20.0), Err(EnoceanError::UnsupportedEep(_))));
    }

    #[test]
    fn test_device_json_layout() {
        let mut device = Device::new(EEP_A5_20_06, 0x049);
        device.configuration.set_setpoint(19.5).unwrap();

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["eep"], "A5-20-06");
        assert_eq!(json["manufacturer_id"], 0x049);
        assert_eq!(json["setpoint"], 19.5);
        assert_eq!(json["dirty"], true);

        let back: Device = serde_json::from_value(json).unwrap();
        assert_eq!(back, device);
    }

    #[test]
    fn test_unsupported_device_json() {
        let device = Device::new(Eep::new(0xD2, 0x01, 0x01), 0x00B);
        let json = serde_json::to_string(&device).unwrap();
        assert_eq!(json, r#"{"eep":"D2-01-01","manufacturer_id":11}"#);

        let back: Device = serde_json::from_str(r#"{"eep":"D2-01-01","manufacturer_id":11,"extra":1}"#).unwrap();
        assert_eq!(back, device);
    }
}
