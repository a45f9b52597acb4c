//! # A5-20-01: Battery Powered Heating Valve
//!
//! Actuator to gateway: DB3 valve position (%), DB2 status flags,
//! DB1 temperature 0..255 for 0..40 °C.
//!
//! Gateway to actuator: DB3 valve position (%) or setpoint 0..255 for
//! 0..40 °C, DB2 room temperature 0..255 for 0..40 °C, DB1 mode bits
//! (`RIN LFS VO VC SB SPS SPN RCU`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SetpointSelection;
use crate::enocean::frame::Frame;
use crate::enocean::protocol::{Txid, RORG_4BS};
use crate::enocean::telegram::{AddressedTelegram, Telegram4BS};
use crate::error::{EnoceanError, Result};

/// Full scale of the temperature fields in °C
const TEMPERATURE_SPAN: f32 = 40.0;

fn temperature_to_raw(celsius: f32) -> u8 {
    (celsius / TEMPERATURE_SPAN * 255.0).round().clamp(0.0, 255.0) as u8
}

fn raw_to_temperature(raw: u8) -> f32 {
    raw as f32 * TEMPERATURE_SPAN / 255.0
}

/// Read-side view over an A5-20-01 data telegram
#[derive(Debug, Clone, Copy)]
pub struct A52001Telegram<'a> {
    telegram: Telegram4BS<'a>,
}

impl<'a> A52001Telegram<'a> {
    pub fn new(frame: &'a Frame) -> Result<Self> {
        let telegram = Telegram4BS::new(frame)?;
        if telegram.is_teach_in() {
            return Err(EnoceanError::malformed("A5-20-01 view over a teach-in telegram"));
        }
        Ok(Self { telegram })
    }

    pub fn current_value(&self) -> u8 {
        self.telegram.db3()
    }

    pub fn service_on(&self) -> bool {
        self.telegram.db2() & 0x80 != 0
    }

    pub fn energy_harvesting(&self) -> bool {
        self.telegram.db2() & 0x40 != 0
    }

    pub fn energy_storage_sufficient(&self) -> bool {
        self.telegram.db2() & 0x20 != 0
    }

    /// Battery needs replacing within days
    pub fn battery_low(&self) -> bool {
        self.telegram.db2() & 0x10 != 0
    }

    pub fn cover_open(&self) -> bool {
        self.telegram.db2() & 0x08 != 0
    }

    pub fn sensor_failure(&self) -> bool {
        self.telegram.db2() & 0x04 != 0
    }

    pub fn window_open(&self) -> bool {
        self.telegram.db2() & 0x02 != 0
    }

    pub fn actuator_obstructed(&self) -> bool {
        self.telegram.db2() & 0x01 != 0
    }

    /// Ambient temperature in °C
    pub fn temperature(&self) -> f32 {
        raw_to_temperature(self.telegram.db1())
    }

    pub fn report(&self) -> A52001Report {
        A52001Report {
            current_value: self.current_value(),
            temperature: self.temperature(),
            service_on: self.service_on(),
            energy_harvesting: self.energy_harvesting(),
            energy_storage_sufficient: self.energy_storage_sufficient(),
            battery_low: self.battery_low(),
            cover_open: self.cover_open(),
            sensor_failure: self.sensor_failure(),
            window_open: self.window_open(),
            actuator_obstructed: self.actuator_obstructed(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct A52001Report {
    pub current_value: u8,
    pub temperature: f32,
    pub service_on: bool,
    pub energy_harvesting: bool,
    pub energy_storage_sufficient: bool,
    pub battery_low: bool,
    pub cover_open: bool,
    pub sensor_failure: bool,
    pub window_open: bool,
    pub actuator_obstructed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct A52001State {
    pub last_frame: Option<Frame>,
    pub last_seen: Option<DateTime<Utc>>,
    pub rssi: Option<f64>,
    pub report: Option<A52001Report>,
}

impl A52001State {
    pub fn update(&mut self, frame: &Frame, rssi: f64, now: DateTime<Utc>) -> Result<A52001Report> {
        let report = A52001Telegram::new(frame)?.report();
        self.last_frame = Some(frame.clone());
        self.last_seen = Some(now);
        self.rssi = Some(rssi);
        self.report = Some(report);
        Ok(report)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct A52001Configuration {
    pub setpoint: f32,
    pub valve_position: u8,
    pub setpoint_selection: SetpointSelection,
    pub reference_run: bool,
    pub lift_set: bool,
    pub valve_open: bool,
    pub valve_closed: bool,
    pub summer_mode: bool,
    pub setpoint_inverse: bool,
    /// Room temperature from a separate sensor; sets the RCU bit
    pub room_temperature: Option<f32>,
    pub dirty: bool,
}

impl Default for A52001Configuration {
    fn default() -> Self {
        Self {
            setpoint: 21.0,
            valve_position: 0,
            setpoint_selection: SetpointSelection::Temperature,
            reference_run: false,
            lift_set: false,
            valve_open: false,
            valve_closed: false,
            summer_mode: false,
            setpoint_inverse: false,
            room_temperature: None,
            dirty: false,
        }
    }
}

impl A52001Configuration {
    pub fn setpoint_raw(&self) -> u8 {
        temperature_to_raw(self.setpoint)
    }

    /// Mark a pending write as delivered
    ///
    /// The actuator listens right after its own report, so the update
    /// sent in reply completes the write; there is no setpoint echo.
    pub fn acknowledge(&mut self) {
        self.dirty = false;
    }

    pub fn mk_update(&self, source: Txid, destination: Txid, status: u8) -> Result<Frame> {
        let db3 = match self.setpoint_selection {
            SetpointSelection::Temperature => self.setpoint_raw(),
            SetpointSelection::ValvePosition => self.valve_position.min(100),
        };
        let db2 = self.room_temperature.map(temperature_to_raw).unwrap_or(0);
        let db1 = ((self.reference_run as u8) << 7)
            | ((self.lift_set as u8) << 6)
            | ((self.valve_open as u8) << 5)
            | ((self.valve_closed as u8) << 4)
            | ((self.summer_mode as u8) << 3)
            | (((self.setpoint_selection == SetpointSelection::Temperature) as u8) << 2)
            | ((self.setpoint_inverse as u8) << 1)
            | self.room_temperature.is_some() as u8;

        let frame = Frame::new(RORG_4BS, &[db3, db2, db1, 0x08], source, status)?;
        AddressedTelegram::wrap(&frame, destination)
    }
}
