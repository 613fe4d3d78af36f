//! Packet types shared by the decoder and the capture bridge

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Per-packet metadata reported by the capture engine
///
/// This is a by-value copy of the engine's header, so it stays valid after
/// the capture callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    /// Capture time as an offset from the UNIX epoch
    pub timestamp: Duration,
    /// Number of bytes actually captured
    pub caplen: u32,
    /// Original length of the packet on the wire
    pub len: u32,
}

impl PacketHeader {
    /// Create a header from engine timestamp parts
    ///
    /// Negative or out-of-range microsecond values are clamped to zero.
    pub fn new(ts_sec: i64, ts_usec: i64, caplen: u32, len: u32) -> Self {
        let secs = u64::try_from(ts_sec).unwrap_or(0);
        let micros = u32::try_from(ts_usec).unwrap_or(0).min(999_999);
        Self {
            timestamp: Duration::new(secs, micros * 1_000),
            caplen,
            len,
        }
    }

    /// Capture time as a `SystemTime`
    pub fn time(&self) -> SystemTime {
        UNIX_EPOCH + self.timestamp
    }

    /// Whole seconds of the capture timestamp
    pub fn ts_sec(&self) -> u64 {
        self.timestamp.as_secs()
    }

    /// Sub-second part of the capture timestamp in nanoseconds
    pub fn ts_nanos(&self) -> u32 {
        self.timestamp.subsec_nanos()
    }

    /// True when the snapshot length cut the packet short
    pub fn is_truncated(&self) -> bool {
        self.caplen < self.len
    }
}

/// Outcome a loop handler returns for each packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    /// Keep the capture loop running
    #[default]
    Continue,
    /// Ask the capture loop to stop after this packet
    Stop,
}

impl Verdict {
    /// Check if the loop should stop
    pub fn is_stop(self) -> bool {
        self == Verdict::Stop
    }
}

impl From<bool> for Verdict {
    /// `true` means stop, matching the convention of returning "quit"
    fn from(stop: bool) -> Self {
        if stop {
            Verdict::Stop
        } else {
            Verdict::Continue
        }
    }
}
