//! # EnOcean Gateway Library
//!
//! Radio-protocol stack and gateway for EnOcean heating actuators.
//!
//! This library decodes demodulated captures into integrity-checked ERP1
//! frames, interprets them as typed telegrams, runs the teach-in handshake,
//! keeps per-device state and configuration, and encodes replies for
//! jittered triple retransmission.

pub mod config;
pub mod console;
pub mod enocean;
pub mod error;
pub mod gateway;
pub mod profiles;
pub mod radio;
