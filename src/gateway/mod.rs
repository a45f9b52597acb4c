//! # Gateway Module
//!
//! Receive-side dispatch and the device registry.
//!
//! This module handles:
//! - Decoding captures and counting frame statistics
//! - The 4BS teach-in handshake (learning mode)
//! - Updating device state and replying with configuration updates
//! - Unwrapping addressed telegrams sent to the gateway
//! - SYS_EX reassembly and the identify request
//! - Loading and saving the gateway state file
//!
//! All state sits behind one mutex held for the dispatch of a single
//! frame. Replies are collected during dispatch and transmitted after the
//! lock is released, so a slow retransmission never stalls other callers.

pub mod persistence;
pub mod reassembly;
pub mod stats;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::enocean::decoder::get_frames;
use crate::enocean::frame::Frame;
use crate::enocean::protocol::*;
use crate::enocean::sys_ex::SysExErp1;
use crate::enocean::telegram::{AddressedTelegram, Telegram4BS, TelegramLearn4BS3};
use crate::error::{EnoceanError, Result};
use crate::profiles::{self, Device, DeviceConfiguration, DeviceState, SetpointSelection};
use crate::radio::FrameSink;

pub use persistence::GatewayConfiguration;
pub use reassembly::{Reassembly, SysExMessage};
pub use stats::{Statistics, StatisticsSnapshot};

/// SYS_EX function: identify request
pub const SYS_EX_IDENTIFY: u16 = 0x006;

/// SYS_EX function: identify reply
pub const SYS_EX_IDENTIFY_REPLY: u16 = 0x606;

/// Frames produced during dispatch, with their force flag
type Outbox = Vec<(Frame, bool)>;

struct GatewayState {
    config: GatewayConfiguration,
    reassembly: Reassembly,
    sys_ex_seq: u8,
}

/// EnOcean gateway: one radio identity plus its learned devices
pub struct Gateway {
    state: Mutex<GatewayState>,
    sink: Arc<dyn FrameSink>,
    stats: Statistics,
    state_path: Option<PathBuf>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("txid", &self.txid())
            .field("state_path", &self.state_path)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway that is never persisted
    pub fn new(config: GatewayConfiguration, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            state: Mutex::new(GatewayState {
                config,
                reassembly: Reassembly::default(),
                sys_ex_seq: 0,
            }),
            sink,
            stats: Statistics::default(),
            state_path: None,
        }
    }

    /// Create a gateway backed by a state file
    ///
    /// An existing file wins over `seed`; otherwise `seed` is used and
    /// written on the first save.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn open<P: AsRef<Path>>(
        path: P,
        seed: GatewayConfiguration,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            GatewayConfiguration::load(path)?
        } else {
            info!("No state file at {}, starting fresh", path.display());
            seed
        };
        info!(
            "Gateway {} (EEP {}, {} device(s))",
            config.txid,
            config.eep,
            config.devices.len()
        );

        let mut gateway = Self::new(config, sink);
        gateway.state_path = Some(path.to_path_buf());
        Ok(gateway)
    }

    /// Expire partial SYS_EX messages older than `timeout`
    pub fn with_reassembly_timeout(self, timeout: Option<Duration>) -> Self {
        self.lock().reassembly = Reassembly::new(timeout);
        self
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decode a raw capture and dispatch every frame with a valid hash
    pub fn receive(&self, packet: &[u8], rssi: f64) {
        let frames = get_frames(packet);
        if frames.is_empty() {
            self.stats.record_non_frame();
            return;
        }

        for frame in frames {
            if let Err(e) = frame.verify() {
                self.stats.record_crc_error();
                debug!("Dropping {}: {}", frame.describe(), e);
                continue;
            }
            self.stats.record_frame();
            self.inject(&frame, rssi);
        }
    }

    /// Dispatch a frame directly, bypassing PHY decoding
    pub fn inject(&self, frame: &Frame, rssi: f64) {
        debug!("RX {} ({:.1} dBm)", frame.describe(), rssi);

        let mut outbox = Outbox::new();
        {
            let mut state = self.lock();
            if let Err(e) = state.dispatch(frame, rssi, Utc::now(), Instant::now(), &mut outbox) {
                warn!("Dropped {}: {}", frame.describe(), e);
            }
        }

        for (reply, force) in outbox {
            if let Err(e) = self.send(&reply, force) {
                warn!("Failed to send {}: {}", reply.describe(), e);
            }
        }
    }

    /// Transmit a frame if the gateway is acting (or `force` is set)
    pub fn send(&self, frame: &Frame, force: bool) -> Result<()> {
        if !force && !self.acting() {
            debug!("Not acting, suppressed TX {}", frame);
            return Ok(());
        }
        debug!("TX {}", frame);
        self.sink.send_frame(frame)
    }

    pub fn txid(&self) -> Txid {
        self.lock().config.txid
    }

    pub fn learning(&self) -> bool {
        self.lock().config.learning
    }

    pub fn set_learning(&self, learning: bool) {
        self.lock().config.learning = learning;
        info!("Learning {}", if learning { "enabled" } else { "disabled" });
    }

    pub fn acting(&self) -> bool {
        self.lock().config.acting
    }

    pub fn set_acting(&self, acting: bool) {
        self.lock().config.acting = acting;
        info!("Acting {}", if acting { "enabled" } else { "disabled" });
    }

    /// Write a temperature setpoint; the device picks it up with the
    /// reply to its next report
    ///
    /// # Errors
    ///
    /// Returns `UnknownDevice` or `UnsupportedEep`
    pub fn set_setpoint(&self, txid: Txid, celsius: f32) -> Result<()> {
        let mut state = self.lock();
        let device = state
            .config
            .devices
            .get_mut(&txid)
            .ok_or(EnoceanError::UnknownDevice(txid))?;
        device.configuration.set_setpoint(celsius)?;
        info!("{}: setpoint {:.1} °C pending", txid, celsius);
        Ok(())
    }

    /// Snapshot of the device registry
    pub fn devices(&self) -> BTreeMap<Txid, Device> {
        self.lock().config.devices.clone()
    }

    /// Snapshot of everything that gets persisted
    pub fn configuration(&self) -> GatewayConfiguration {
        self.lock().config.clone()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    /// Senders with a partial SYS_EX message waiting for more fragments
    pub fn pending_sys_ex(&self) -> usize {
        self.lock().reassembly.pending()
    }

    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    /// Write the state file, if the gateway has one
    pub fn save(&self) -> Result<()> {
        match &self.state_path {
            Some(path) => self.lock().config.save(path),
            None => {
                debug!("No state file configured, not saving");
                Ok(())
            }
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if self.state_path.is_some() {
            if let Err(e) = self.save() {
                warn!("Failed to save gateway state: {}", e);
            }
        }
    }
}

impl GatewayState {
    fn dispatch(
        &mut self,
        frame: &Frame,
        rssi: f64,
        now: DateTime<Utc>,
        instant: Instant,
        out: &mut Outbox,
    ) -> Result<()> {
        match frame.rorg() {
            RORG_4BS => self.dispatch_4bs(frame, rssi, now, out),
            RORG_ADDRESSED => self.dispatch_addressed(frame, rssi, now, instant, out),
            RORG_SYS_EX => self.dispatch_fragment(frame, rssi, instant, out),
            rorg => {
                debug!("Unhandled RORG 0x{:02X}", rorg);
                Ok(())
            }
        }
    }

    fn dispatch_addressed(
        &mut self,
        frame: &Frame,
        rssi: f64,
        now: DateTime<Utc>,
        instant: Instant,
        out: &mut Outbox,
    ) -> Result<()> {
        let telegram = AddressedTelegram::new(frame)?;
        if telegram.destination() != self.config.txid {
            debug!("{}: addressed to {}, not to us", frame.txid(), telegram.destination());
            return Ok(());
        }

        let inner = telegram.inner()?;
        match inner.rorg() {
            RORG_4BS => self.dispatch_4bs(&inner, rssi, now, out),
            RORG_SYS_EX => self.dispatch_fragment(&inner, rssi, instant, out),
            rorg => {
                debug!("Unhandled addressed RORG 0x{:02X}", rorg);
                Ok(())
            }
        }
    }

    fn dispatch_4bs(
        &mut self,
        frame: &Frame,
        rssi: f64,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) -> Result<()> {
        let telegram = Telegram4BS::new(frame)?;
        if telegram.is_teach_in() {
            return self.teach_in(frame, out);
        }

        let source = frame.txid();
        let gateway = self.config.txid;
        let device = self
            .config
            .devices
            .get_mut(&source)
            .ok_or(EnoceanError::UnknownDevice(source))?;

        match (&mut device.state, &mut device.configuration) {
            (DeviceState::A52006(state), DeviceConfiguration::A52006(config)) => {
                let report = state.update(frame, rssi, now)?;
                debug!("{}: {:?}", source, report);

                if config.setpoint_selection == SetpointSelection::Temperature {
                    config.reconcile(&report);
                    out.push((config.mk_update(gateway, source, 0)?, false));
                } else {
                    info!("{}: valve-position setpoint mode not implemented", source);
                }
            }
            (DeviceState::A52001(state), DeviceConfiguration::A52001(config)) => {
                let report = state.update(frame, rssi, now)?;
                debug!("{}: {:?}", source, report);

                if config.setpoint_selection == SetpointSelection::Temperature {
                    out.push((config.mk_update(gateway, source, 0)?, false));
                    config.acknowledge();
                } else {
                    info!("{}: valve-position setpoint mode not implemented", source);
                }
            }
            _ => return Err(EnoceanError::UnsupportedEep(device.eep)),
        }
        Ok(())
    }

    fn teach_in(&mut self, frame: &Frame, out: &mut Outbox) -> Result<()> {
        let learn = TelegramLearn4BS3::new(frame)?;
        let source = frame.txid();

        if !self.config.learning {
            info!("{}: teach-in ignored, learning disabled", source);
            return Ok(());
        }

        let gateway = self.config.txid;
        let manufacturer_id = self.config.manufacturer_id;

        if learn.learn_type_with_eep() {
            let eep = learn.eep();
            let device_mid = learn.manufacturer_id();

            match self.config.devices.get_mut(&source) {
                Some(device) if device.eep == eep => {
                    device.manufacturer_id = device_mid;
                    info!("{}: teach-in repeated (EEP {})", source, eep);
                }
                _ => {
                    self.config.devices.insert(source, Device::new(eep, device_mid));
                    info!(
                        "{}: learned EEP {} manufacturer 0x{:03X}",
                        source, eep, device_mid
                    );
                }
            }

            if profiles::is_supported(eep) {
                let ack = TelegramLearn4BS3::response(gateway, source, eep, manufacturer_id, true)?;
                out.push((ack, false));
            } else {
                warn!("{}: no codec for EEP {}, not acknowledging", source, eep);
            }
        } else if let Some(device) = self.config.devices.get(&source) {
            let supported = profiles::is_supported(device.eep);
            let ack = TelegramLearn4BS3::response(gateway, source, device.eep, manufacturer_id, supported)?;
            out.push((ack, false));
        } else {
            warn!("{}: teach-in without EEP/MID from unknown device", source);
        }
        Ok(())
    }

    fn dispatch_fragment(
        &mut self,
        frame: &Frame,
        rssi: f64,
        instant: Instant,
        out: &mut Outbox,
    ) -> Result<()> {
        let fragment = SysExErp1::new(frame.clone())?;
        match self.reassembly.push(fragment, instant)? {
            Some(message) => self.dispatch_sys_ex(&message, rssi, out),
            None => Ok(()),
        }
    }

    fn next_sys_ex_seq(&mut self) -> u8 {
        self.sys_ex_seq = self.sys_ex_seq % 3 + 1;
        self.sys_ex_seq
    }

    fn dispatch_sys_ex(&mut self, message: &SysExMessage, rssi: f64, out: &mut Outbox) -> Result<()> {
        debug!(
            "{}: SYS_EX function 0x{:03X} manufacturer 0x{:03X}, {} byte(s)",
            message.source,
            message.function,
            message.manufacturer_id,
            message.payload.len()
        );

        match message.function {
            SYS_EX_IDENTIFY => {
                let reply = identify_payload(self.config.eep, rssi);
                let seq = self.next_sys_ex_seq();
                let fragments = SysExErp1::fragments(
                    self.config.txid,
                    seq,
                    message.manufacturer_id,
                    SYS_EX_IDENTIFY_REPLY,
                    &reply,
                )?;
                for fragment in fragments {
                    out.push((AddressedTelegram::wrap(&fragment, message.source)?, false));
                }
                info!("{}: identify request answered", message.source);
            }
            function => debug!("{}: unhandled SYS_EX function 0x{:03X}", message.source, function),
        }
        Ok(())
    }
}

/// Identify reply: the gateway EEP in teach-in layout and the RSSI of the
/// request as a positive dB value
///
/// The EEP bytes stay zero when FUNC or TYPE do not fit the 6/7-bit fields.
fn identify_payload(eep: Eep, rssi: f64) -> [u8; 4] {
    let mut reply = [0u8; 4];
    if eep.func <= 0x3F && eep.kind <= 0x7F {
        reply[0] = eep.rorg;
        reply[1] = (eep.func << 2) | (eep.kind >> 5);
        reply[2] = (eep.kind & 0x1F) << 3;
    }
    reply[3] = (-rssi).clamp(0.0, 255.0) as u8;
    reply
}
