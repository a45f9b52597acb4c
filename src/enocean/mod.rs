//! # EnOcean Radio Protocol Module
//!
//! Implementation of the EnOcean ERP1 radio protocol.
//!
//! This module handles:
//! - CRC-8 and checksum integrity primitives
//! - Frame validation and field access
//! - PHY decoding of demodulated captures and encoding for transmission
//! - Typed telegram views (4BS, teach-in, addressed, SYS_EX)

pub mod protocol;
pub mod crc;
pub mod frame;
pub mod decoder;
pub mod encoder;
pub mod telegram;
pub mod sys_ex;
