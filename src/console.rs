//! # Operator Console
//!
//! Line commands read from stdin:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `learn on\|off` | toggle teach-in acceptance |
//! | `acting on\|off` | toggle replies to devices |
//! | `ping` | liveness check |
//! | `crc8 <hex>` / `checksum <hex>` / `checkxor <hex>` | integrity of a byte string |
//! | `t\|transmit <hex>` | frame RORG+DATA under the gateway TXID and send it |
//! | `ta <dest> <hex>` | same, addressed to `dest` |
//! | `inject <hex> [rssi]` | dispatch a complete frame as if received |
//! | `setpoint <txid> <celsius>` | queue a setpoint write |
//! | `devices` / `stats` / `save` | registry, counters, persist |

use std::fmt::Write as _;
use std::str::FromStr;

use crate::enocean::crc::{checksum, checkxor, crc8};
use crate::enocean::frame::Frame;
use crate::enocean::protocol::{Txid, CRC8_POLYNOMIAL};
use crate::enocean::telegram::AddressedTelegram;
use crate::error::{EnoceanError, Result};
use crate::gateway::Gateway;
use crate::profiles::{DeviceConfiguration, DeviceState};

/// RSSI assumed for injected frames when none is given
const DEFAULT_INJECT_RSSI: f64 = -50.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Learn(bool),
    Acting(bool),
    Ping,
    Crc8(Vec<u8>),
    Checksum(Vec<u8>),
    Checkxor(Vec<u8>),
    Transmit(Vec<u8>),
    TransmitAddressed(Txid, Vec<u8>),
    Inject(Vec<u8>, f64),
    Setpoint(Txid, f32),
    Devices,
    Stats,
    Save,
    Help,
}

fn parse_switch(arg: Option<&str>) -> Result<bool> {
    match arg {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        other => Err(EnoceanError::InvalidCommand(format!(
            "expected on|off, got {:?}",
            other.unwrap_or("")
        ))),
    }
}

fn parse_hex(arg: Option<&str>) -> Result<Vec<u8>> {
    let text = arg.ok_or_else(|| EnoceanError::InvalidCommand("missing hex argument".to_string()))?;
    Ok(hex::decode(text)?)
}

fn parse_txid(arg: Option<&str>) -> Result<Txid> {
    arg.ok_or_else(|| EnoceanError::InvalidCommand("missing TXID".to_string()))?
        .parse()
}

impl FromStr for Command {
    type Err = EnoceanError;

    fn from_str(line: &str) -> Result<Self> {
        let mut args = line.split_whitespace();
        let name = args
            .next()
            .ok_or_else(|| EnoceanError::InvalidCommand("empty command".to_string()))?;

        let command = match name {
            "learn" => Command::Learn(parse_switch(args.next())?),
            "acting" => Command::Acting(parse_switch(args.next())?),
            "ping" => Command::Ping,
            "crc8" => Command::Crc8(parse_hex(args.next())?),
            "checksum" => Command::Checksum(parse_hex(args.next())?),
            "checkxor" => Command::Checkxor(parse_hex(args.next())?),
            "t" | "transmit" => Command::Transmit(parse_hex(args.next())?),
            "ta" => {
                let destination = parse_txid(args.next())?;
                Command::TransmitAddressed(destination, parse_hex(args.next())?)
            }
            "inject" => {
                let bytes = parse_hex(args.next())?;
                let rssi = match args.next() {
                    Some(text) => text
                        .parse()
                        .map_err(|_| EnoceanError::InvalidCommand(format!("invalid RSSI: {}", text)))?,
                    None => DEFAULT_INJECT_RSSI,
                };
                Command::Inject(bytes, rssi)
            }
            "setpoint" => {
                let txid = parse_txid(args.next())?;
                let text = args
                    .next()
                    .ok_or_else(|| EnoceanError::InvalidCommand("missing setpoint".to_string()))?;
                let celsius = text
                    .parse()
                    .map_err(|_| EnoceanError::InvalidCommand(format!("invalid setpoint: {}", text)))?;
                Command::Setpoint(txid, celsius)
            }
            "devices" => Command::Devices,
            "stats" => Command::Stats,
            "save" => Command::Save,
            "help" | "?" => Command::Help,
            other => return Err(EnoceanError::InvalidCommand(format!("unknown command: {}", other))),
        };
        Ok(command)
    }
}

/// Frame `bytes` (RORG then DATA) under `source`
fn build_frame(bytes: &[u8], source: Txid) -> Result<Frame> {
    let (rorg, data) = bytes
        .split_first()
        .ok_or_else(|| EnoceanError::InvalidCommand("empty telegram".to_string()))?;
    Frame::new(*rorg, data, source, 0)
}

impl Command {
    /// Run against `gateway`, returning the text to show the operator
    ///
    /// Transmissions are forced, so they go out even when the gateway is
    /// not acting. Blocks for the retransmission window.
    pub fn execute(&self, gateway: &Gateway) -> Result<String> {
        match self {
            Command::Learn(on) => {
                gateway.set_learning(*on);
                Ok(format!("learning {}", if *on { "on" } else { "off" }))
            }
            Command::Acting(on) => {
                gateway.set_acting(*on);
                Ok(format!("acting {}", if *on { "on" } else { "off" }))
            }
            Command::Ping => Ok("pong".to_string()),
            Command::Crc8(bytes) => Ok(format!("0x{:02x}", crc8(bytes, CRC8_POLYNOMIAL, false))),
            Command::Checksum(bytes) => Ok(format!("0x{:02x}", checksum(bytes, false))),
            Command::Checkxor(bytes) => Ok(format!("0x{:02x}", checkxor(bytes, false))),
            Command::Transmit(bytes) => {
                let frame = build_frame(bytes, gateway.txid())?;
                gateway.send(&frame, true)?;
                Ok(format!("TX {}", frame))
            }
            Command::TransmitAddressed(destination, bytes) => {
                let frame = build_frame(bytes, gateway.txid())?;
                let frame = AddressedTelegram::wrap(&frame, *destination)?;
                gateway.send(&frame, true)?;
                Ok(format!("TX {}", frame))
            }
            Command::Inject(bytes, rssi) => {
                let frame = Frame::from_bytes(bytes.clone())?;
                gateway.inject(&frame, *rssi);
                Ok(format!("RX {}", frame.describe()))
            }
            Command::Setpoint(txid, celsius) => {
                gateway.set_setpoint(*txid, *celsius)?;
                Ok(format!("{}: setpoint {:.1} pending", txid, celsius))
            }
            Command::Devices => Ok(render_devices(gateway)),
            Command::Stats => {
                let s = gateway.statistics();
                Ok(format!(
                    "frames {} non_frames {} crc_errors {} pending_sys_ex {}",
                    s.frames,
                    s.non_frames,
                    s.crc_errors,
                    gateway.pending_sys_ex()
                ))
            }
            Command::Save => {
                gateway.save()?;
                Ok(match gateway.state_path() {
                    Some(path) => format!("saved to {}", path.display()),
                    None => "no state file configured".to_string(),
                })
            }
            Command::Help => Ok(
                "learn on|off, acting on|off, ping, crc8|checksum|checkxor <hex>, \
                 t <hex>, ta <dest> <hex>, inject <hex> [rssi], setpoint <txid> <celsius>, \
                 devices, stats, save"
                    .to_string(),
            ),
        }
    }
}

fn render_devices(gateway: &Gateway) -> String {
    let devices = gateway.devices();
    if devices.is_empty() {
        return "no devices".to_string();
    }

    let mut out = String::new();
    for (txid, device) in &devices {
        let _ = write!(out, "{} {} mid 0x{:03x}", txid, device.eep, device.manufacturer_id);
        match &device.configuration {
            DeviceConfiguration::A52001(c) => {
                let _ = write!(out, " setpoint {:.1}", c.setpoint);
            }
            DeviceConfiguration::A52006(c) => {
                let _ = write!(out, " setpoint {:.1}", c.setpoint);
            }
            DeviceConfiguration::Unsupported(_) => out.push_str(" unsupported"),
        }
        if device.configuration.dirty() {
            out.push_str(" (pending)");
        }
        match &device.state {
            DeviceState::A52006(s) => {
                if let Some(r) = &s.report {
                    let _ = write!(out, " valve {}% {:.1} °C", r.current_value, r.temperature);
                }
            }
            DeviceState::A52001(s) => {
                if let Some(r) = &s.report {
                    let _ = write!(out, " valve {}% {:.1} °C", r.current_value, r.temperature);
                }
            }
            DeviceState::Unsupported => {}
        }
        if let (Some(seen), Some(rssi)) = (device.state.last_seen(), device.state.rssi()) {
            let _ = write!(out, " seen {} {:.0} dBm", seen.format("%H:%M:%S"), rssi);
        }
        out.push('\n');
    }
    out.pop();
    out
}
