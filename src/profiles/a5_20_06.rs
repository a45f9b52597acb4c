//! # A5-20-06: Harvesting Heating Valve with Local Offset
//!
//! Actuator to gateway (data telegram):
//!
//! | Byte | Bits | Field |
//! |------|------|-------|
//! | DB3 | 7..0 | CV: valve position 0..100 % |
//! | DB2 | 7 | LOM: local offset mode (1 = absolute) |
//! | DB2 | 6..0 | LO: relative -10..+10 K, or absolute 0..80 (0.5 °C) |
//! | DB1 | 7..0 | TMP: temperature 0..80 (0.5 °C) |
//! | DB0 | 7 | TSL: 0 = ambient, 1 = feed temperature |
//! | DB0 | 6 | ENIE: energy harvesting active |
//! | DB0 | 5 | ES: energy storage sufficiently charged |
//! | DB0 | 4 | DWO: window open detected |
//! | DB0 | 2 | RCE: radio communication error |
//! | DB0 | 1 | RSS: radio signal weak |
//! | DB0 | 0 | ACO: actuator obstructed |
//!
//! Gateway to actuator (always addressed):
//!
//! | Byte | Bits | Field |
//! |------|------|-------|
//! | DB3 | 7..0 | SP: valve position 0..100 % or setpoint 0..80 (0.5 °C) |
//! | DB2 | 7..0 | TMP: room temperature 0..160 (0.25 °C) |
//! | DB1 | 7 | REF: reference run |
//! | DB1 | 6..4 | RFC: radio interval |
//! | DB1 | 3 | SB: summer bit |
//! | DB1 | 2 | SPS: setpoint selection (1 = temperature) |
//! | DB1 | 1 | TSL: request feed temperature |
//! | DB1 | 0 | SBY: standby |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SetpointSelection, TemperatureSelection};
use crate::enocean::frame::Frame;
use crate::enocean::protocol::{Txid, RORG_4BS};
use crate::enocean::telegram::{AddressedTelegram, Telegram4BS};
use crate::error::{EnoceanError, Result};

/// Highest raw setpoint (40 °C in 0.5 °C steps)
pub const SETPOINT_RAW_MAX: u8 = 80;

/// Highest raw room temperature (40 °C in 0.25 °C steps)
const ROOM_TEMPERATURE_RAW_MAX: f32 = 160.0;

/// Local offset reported by the actuator's knob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOffset {
    /// Offset in kelvin relative to the gateway setpoint
    Relative(i8),
    /// Absolute setpoint in 0.5 °C steps
    Absolute(u8),
}

/// Radio communication interval requested from the actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RadioInterval {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "2min")]
    Minutes2,
    #[serde(rename = "5min")]
    Minutes5,
    #[serde(rename = "10min")]
    Minutes10,
    #[serde(rename = "20min")]
    Minutes20,
    #[serde(rename = "30min")]
    Minutes30,
    #[serde(rename = "60min")]
    Minutes60,
    #[serde(rename = "120min")]
    Minutes120,
}

impl RadioInterval {
    /// 3-bit RFC field value
    pub fn code(self) -> u8 {
        match self {
            RadioInterval::Auto => 0,
            RadioInterval::Minutes2 => 1,
            RadioInterval::Minutes5 => 2,
            RadioInterval::Minutes10 => 3,
            RadioInterval::Minutes20 => 4,
            RadioInterval::Minutes30 => 5,
            RadioInterval::Minutes60 => 6,
            RadioInterval::Minutes120 => 7,
        }
    }
}

/// Read-side view over an A5-20-06 data telegram
#[derive(Debug, Clone, Copy)]
pub struct A52006Telegram<'a> {
    telegram: Telegram4BS<'a>,
}

impl<'a> A52006Telegram<'a> {
    pub fn new(frame: &'a Frame) -> Result<Self> {
        let telegram = Telegram4BS::new(frame)?;
        if telegram.is_teach_in() {
            return Err(EnoceanError::malformed("A5-20-06 view over a teach-in telegram"));
        }
        Ok(Self { telegram })
    }

    /// Valve position in percent
    pub fn current_value(&self) -> u8 {
        self.telegram.db3()
    }

    pub fn local_offset_absolute(&self) -> bool {
        self.telegram.db2() & 0x80 != 0
    }

    pub fn local_offset(&self) -> LocalOffset {
        let raw = self.telegram.db2() & 0x7F;
        if self.local_offset_absolute() {
            LocalOffset::Absolute(raw)
        } else {
            // 7-bit two's complement
            LocalOffset::Relative(((raw << 1) as i8) >> 1)
        }
    }

    pub fn temperature_raw(&self) -> u8 {
        self.telegram.db1()
    }

    /// Ambient or feed temperature in °C, per [`Self::temperature_selection`]
    pub fn temperature(&self) -> f32 {
        self.temperature_raw() as f32 / 2.0
    }

    pub fn temperature_selection(&self) -> TemperatureSelection {
        if self.telegram.db0() & 0x80 != 0 {
            TemperatureSelection::Feed
        } else {
            TemperatureSelection::Ambient
        }
    }

    pub fn energy_harvesting(&self) -> bool {
        self.telegram.db0() & 0x40 != 0
    }

    pub fn energy_storage_sufficient(&self) -> bool {
        self.telegram.db0() & 0x20 != 0
    }

    pub fn window_open(&self) -> bool {
        self.telegram.db0() & 0x10 != 0
    }

    pub fn radio_com_error(&self) -> bool {
        self.telegram.db0() & 0x04 != 0
    }

    pub fn radio_signal_weak(&self) -> bool {
        self.telegram.db0() & 0x02 != 0
    }

    pub fn actuator_obstructed(&self) -> bool {
        self.telegram.db0() & 0x01 != 0
    }

    pub fn report(&self) -> A52006Report {
        A52006Report {
            current_value: self.current_value(),
            local_offset: self.local_offset(),
            temperature: self.temperature(),
            temperature_selection: self.temperature_selection(),
            energy_harvesting: self.energy_harvesting(),
            energy_storage_sufficient: self.energy_storage_sufficient(),
            window_open: self.window_open(),
            radio_com_error: self.radio_com_error(),
            radio_signal_weak: self.radio_signal_weak(),
            actuator_obstructed: self.actuator_obstructed(),
        }
    }
}

/// Owned copy of the last decoded status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct A52006Report {
    pub current_value: u8,
    pub local_offset: LocalOffset,
    pub temperature: f32,
    pub temperature_selection: TemperatureSelection,
    pub energy_harvesting: bool,
    pub energy_storage_sufficient: bool,
    pub window_open: bool,
    pub radio_com_error: bool,
    pub radio_signal_weak: bool,
    pub actuator_obstructed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct A52006State {
    pub last_frame: Option<Frame>,
    pub last_seen: Option<DateTime<Utc>>,
    pub rssi: Option<f64>,
    pub report: Option<A52006Report>,
}

impl A52006State {
    pub fn update(&mut self, frame: &Frame, rssi: f64, now: DateTime<Utc>) -> Result<A52006Report> {
        let report = A52006Telegram::new(frame)?.report();
        self.last_frame = Some(frame.clone());
        self.last_seen = Some(now);
        self.rssi = Some(rssi);
        self.report = Some(report);
        Ok(report)
    }
}

/// Operator configuration written to the actuator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct A52006Configuration {
    /// Operator setpoint in °C; a relative knob offset applies on top of it
    pub setpoint: f32,
    /// Valve position in percent, used in valve-position mode
    pub valve_position: u8,
    pub setpoint_selection: SetpointSelection,
    pub reference_run: bool,
    pub communication_interval: RadioInterval,
    pub summer_mode: bool,
    pub temperature_selection: TemperatureSelection,
    pub standby: bool,
    /// Room temperature from a separate sensor, in °C
    pub room_temperature: Option<f32>,
    /// Local write not yet echoed back by the actuator
    pub dirty: bool,
    /// Raw target last derived from a report, sent in temperature mode
    #[serde(skip)]
    pub effective: Option<u8>,
}

impl Default for A52006Configuration {
    fn default() -> Self {
        Self {
            setpoint: 21.0,
            valve_position: 0,
            setpoint_selection: SetpointSelection::Temperature,
            reference_run: false,
            communication_interval: RadioInterval::Auto,
            summer_mode: false,
            temperature_selection: TemperatureSelection::Ambient,
            standby: false,
            room_temperature: None,
            dirty: false,
            effective: None,
        }
    }
}

impl A52006Configuration {
    /// Setpoint in 0.5 °C steps
    pub fn setpoint_raw(&self) -> u8 {
        (self.setpoint * 2.0).round().clamp(0.0, SETPOINT_RAW_MAX as f32) as u8
    }

    pub fn set_setpoint_raw(&mut self, raw: u8) {
        self.setpoint = raw.min(SETPOINT_RAW_MAX) as f32 / 2.0;
    }

    /// Setpoint implied by the actuator's local offset
    pub fn desired_setpoint_raw(&self, report: &A52006Report) -> u8 {
        match report.local_offset {
            LocalOffset::Absolute(raw) => raw.min(SETPOINT_RAW_MAX),
            LocalOffset::Relative(kelvin) => (self.setpoint_raw() as i16 + 2 * kelvin as i16)
                .clamp(0, SETPOINT_RAW_MAX as i16) as u8,
        }
    }

    /// Target the actuator should run at, in 0.5 °C steps
    pub fn effective_setpoint_raw(&self) -> u8 {
        self.effective.unwrap_or_else(|| self.setpoint_raw())
    }

    /// Fold a status report into the configuration
    ///
    /// An absolute offset replaces the setpoint of a clean configuration;
    /// a dirty one keeps the operator's value until the actuator reports it
    /// back. A relative offset never touches the setpoint: it only moves the
    /// effective target, and a dirty configuration clears once a report
    /// confirms the target last sent.
    pub fn reconcile(&mut self, report: &A52006Report) {
        let desired = self.desired_setpoint_raw(report);
        match report.local_offset {
            LocalOffset::Absolute(_) => {
                if !self.dirty {
                    self.set_setpoint_raw(desired);
                } else if desired == self.setpoint_raw() {
                    self.dirty = false;
                }
                self.effective = Some(self.setpoint_raw());
            }
            LocalOffset::Relative(_) => {
                if self.dirty && self.effective == Some(desired) {
                    self.dirty = false;
                }
                self.effective = Some(desired);
            }
        }
    }

    /// Build the addressed update telegram for the actuator
    pub fn mk_update(&self, source: Txid, destination: Txid, status: u8) -> Result<Frame> {
        let db3 = match self.setpoint_selection {
            SetpointSelection::Temperature => self.effective_setpoint_raw(),
            SetpointSelection::ValvePosition => self.valve_position.min(100),
        };
        let db2 = self
            .room_temperature
            .map(|t| (t * 4.0).round().clamp(0.0, ROOM_TEMPERATURE_RAW_MAX) as u8)
            .unwrap_or(0);
        let db1 = ((self.reference_run as u8) << 7)
            | (self.communication_interval.code() << 4)
            | ((self.summer_mode as u8) << 3)
            | (((self.setpoint_selection == SetpointSelection::Temperature) as u8) << 2)
            | (((self.temperature_selection == TemperatureSelection::Feed) as u8) << 1)
            | self.standby as u8;
        let db0 = 0x08;

        let frame = Frame::new(RORG_4BS, &[db3, db2, db1, db0], source, status)?;
        AddressedTelegram::wrap(&frame, destination)
    }
}
