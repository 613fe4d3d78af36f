//! Where captured packets come from
//!
//! A session pulls packets from a [`PacketSource`] one at a time and feeds
//! each through the trampoline. [`LiveSource`] reads from a libpcap handle;
//! [`MemorySource`] replays prepared buffers and needs no privileges.

use pcap::{Active, Capture, Device};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use pktbridge_core::{Error, Result};
use pktbridge_packet::LinkType;

use crate::config::CaptureConfig;
use crate::stats::EngineStats;

/// Result of asking a source for its next packet
pub enum NextPacket<'a> {
    /// A packet; header and data borrow from the source
    Packet(pcap::Packet<'a>),
    /// Nothing arrived within the read timeout
    Timeout,
    /// The source has nothing more to deliver
    Exhausted,
}

/// A supplier of raw packets in the engine's native format
pub trait PacketSource {
    /// Human-readable name for logs
    fn describe(&self) -> String;

    /// Datalink type of the packets, `None` when unsupported by the locator
    fn link_type(&self) -> Option<LinkType>;

    /// Fetch the next packet, blocking at most for the read timeout
    fn next_packet(&mut self) -> Result<NextPacket<'_>>;

    /// Counters kept by the engine, if it has any
    fn engine_stats(&mut self) -> Option<EngineStats> {
        None
    }
}

/// Live capture from a network device
pub struct LiveSource {
    device: String,
    capture: Capture<Active>,
}

impl LiveSource {
    /// Open `device` with the snaplen, timeout, buffer and filter settings of
    /// `config`
    pub fn open(device: &str, config: &CaptureConfig) -> Result<Self> {
        config.validate()?;
        debug!("Initializing pcap capture on {}", device);

        let mut capture = Capture::from_device(Device::from(device))
            .map_err(|e| Error::capture(format!("Failed to create capture: {}", e)))?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(config.timeout_ms)
            .immediate_mode(config.immediate_mode);

        if config.buffer_size > 0 {
            capture = capture.buffer_size(config.buffer_size);
        }

        let capture = capture
            .open()
            .map_err(|e| Error::capture(format!("Failed to open capture: {}", e)))?;

        let mut source = Self::from_capture(device, capture);
        if let Some(filter) = config.filter.as_deref() {
            source.set_filter(filter)?;
        }

        info!("Capture initialized on {}", device);
        Ok(source)
    }

    /// Wrap a handle opened elsewhere
    ///
    /// The handle needs a non-zero read timeout, otherwise a stop on an
    /// idle interface waits for the next packet.
    pub fn from_capture(device: &str, capture: Capture<Active>) -> Self {
        Self {
            device: device.to_string(),
            capture,
        }
    }

    /// Apply a BPF filter; the expression goes to libpcap unchanged
    pub fn set_filter(&mut self, bpf: &str) -> Result<()> {
        self.capture
            .filter(bpf, true)
            .map_err(|e| Error::capture(format!("Failed to apply filter: {}", e)))?;
        debug!("Applied filter: {}", bpf);
        Ok(())
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Raw libpcap datalink value
    pub fn datalink(&self) -> i32 {
        self.capture.get_datalink().0
    }
}

impl PacketSource for LiveSource {
    fn describe(&self) -> String {
        format!("live:{}", self.device)
    }

    fn link_type(&self) -> Option<LinkType> {
        LinkType::from_dlt(self.datalink()).ok()
    }

    fn next_packet(&mut self) -> Result<NextPacket<'_>> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(NextPacket::Packet(packet)),
            Err(pcap::Error::TimeoutExpired) => Ok(NextPacket::Timeout),
            Err(pcap::Error::NoMorePackets) => Ok(NextPacket::Exhausted),
            Err(e) => Err(Error::capture(format!("Failed to read packet: {}", e))),
        }
    }

    fn engine_stats(&mut self) -> Option<EngineStats> {
        match self.capture.stats() {
            Ok(stat) => Some(stat.into()),
            Err(e) => {
                debug!("Failed to get stats: {}", e);
                None
            }
        }
    }
}

/// Packets prepared in memory
///
/// Replays its packets in insertion order. Afterwards it either reports
/// exhaustion or, with [`keep_open`](Self::keep_open), behaves like an idle
/// live capture until the session is stopped.
#[derive(Debug, Clone)]
pub struct MemorySource {
    link: LinkType,
    packets: Vec<(pcap::PacketHeader, Vec<u8>)>,
    cursor: usize,
    idle_timeout: Option<Duration>,
}

impl MemorySource {
    pub fn new(link: LinkType) -> Self {
        Self {
            link,
            packets: Vec::new(),
            cursor: 0,
            idle_timeout: None,
        }
    }

    /// Keep reporting read timeouts of `timeout` once all packets were read
    pub fn keep_open(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Add a packet stamped with the current time
    pub fn push<D: Into<Vec<u8>>>(&mut self, data: D) -> &mut Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.push_at(now, data)
    }

    /// Add a packet with an explicit capture time
    pub fn push_at<D: Into<Vec<u8>>>(&mut self, timestamp: Duration, data: D) -> &mut Self {
        let data = data.into();
        let caplen = u32::try_from(data.len()).unwrap_or(u32::MAX);
        self.push_raw(native_header(timestamp, caplen, caplen), data)
    }

    /// Add a packet whose wire length exceeds what was captured
    pub fn push_truncated<D: Into<Vec<u8>>>(&mut self, data: D, wire_len: u32) -> &mut Self {
        let data = data.into();
        let caplen = u32::try_from(data.len()).unwrap_or(u32::MAX);
        self.push_raw(native_header(Duration::ZERO, caplen, wire_len), data)
    }

    /// Add a packet with a hand-made header, inconsistent ones included
    pub fn push_raw(&mut self, header: pcap::PacketHeader, data: Vec<u8>) -> &mut Self {
        self.packets.push((header, data));
        self
    }

    /// Packets not yet read
    pub fn remaining(&self) -> usize {
        self.packets.len() - self.cursor
    }

    /// Start over from the first packet
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl PacketSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory:{} packets", self.packets.len())
    }

    fn link_type(&self) -> Option<LinkType> {
        Some(self.link)
    }

    fn next_packet(&mut self) -> Result<NextPacket<'_>> {
        if let Some((header, data)) = self.packets.get(self.cursor) {
            self.cursor += 1;
            return Ok(NextPacket::Packet(pcap::Packet::new(header, data)));
        }

        match self.idle_timeout {
            Some(timeout) => {
                thread::sleep(timeout);
                Ok(NextPacket::Timeout)
            }
            None => Ok(NextPacket::Exhausted),
        }
    }

    fn engine_stats(&mut self) -> Option<EngineStats> {
        Some(EngineStats {
            received: self.cursor as u64,
            dropped: 0,
            if_dropped: 0,
        })
    }
}

/// Build an engine header from a capture time
pub fn native_header(timestamp: Duration, caplen: u32, len: u32) -> pcap::PacketHeader {
    pcap::PacketHeader {
        ts: libc::timeval {
            tv_sec: libc::time_t::try_from(timestamp.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_usec: libc::suseconds_t::try_from(timestamp.subsec_micros()).unwrap_or(0),
        },
        caplen,
        len,
    }
}
