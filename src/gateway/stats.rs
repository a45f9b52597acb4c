//! Receive-path counters read by a status display

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by [`super::Gateway::receive`]
#[derive(Debug, Default)]
pub struct Statistics {
    frames: AtomicU64,
    non_frames: AtomicU64,
    crc_errors: AtomicU64,
}

/// Point-in-time copy of [`Statistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Frames decoded with a valid hash
    pub frames: u64,
    /// Captures that produced no frame at all
    pub non_frames: u64,
    /// Frames decoded with a bad hash
    pub crc_errors: u64,
}

impl Statistics {
    pub fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_non_frame(&self) {
        self.non_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crc_error(&self) {
        self.crc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            non_frames: self.non_frames.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
        }
    }
}
