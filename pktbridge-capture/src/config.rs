//! Capture and delivery configuration

use pktbridge_core::{Error, Result};
use tokio::sync::Semaphore;

/// Default snapshot length (maximum bytes per packet)
pub const DEFAULT_SNAPLEN: i32 = 65535;

/// Default timeout for packet capture (milliseconds)
pub const DEFAULT_TIMEOUT_MS: i32 = 1000;

/// Default number of records the channel buffers before backpressure applies
pub const DEFAULT_CHANNEL_CAPACITY: usize = 5000;

/// What the dispatcher does after a handler panicked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Log the fault and keep delivering
    #[default]
    Continue,
    /// Log the fault and stop the capture loop
    Stop,
}

/// Configuration for a capture run
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Maximum bytes to capture per packet
    pub snaplen: i32,
    /// Read timeout in milliseconds
    ///
    /// The capture thread looks at the stop flag between reads, so a stop
    /// on an idle interface takes effect after at most this long. libpcap
    /// reads 0 as "wait forever", which is rejected.
    pub timeout_ms: i32,
    /// Enable promiscuous mode
    pub promiscuous: bool,
    /// Buffer size (0 = default)
    pub buffer_size: i32,
    /// Enable immediate mode (deliver packets immediately)
    pub immediate_mode: bool,
    /// BPF filter expression handed to libpcap verbatim
    pub filter: Option<String>,
    /// Stop after this many packets were dispatched (`None` = unlimited)
    pub max_packets: Option<u64>,
    /// Reaction to a panicking handler
    pub fault_policy: FaultPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: DEFAULT_SNAPLEN,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            promiscuous: true,
            buffer_size: 0,
            immediate_mode: true,
            filter: None,
            max_packets: None,
            fault_policy: FaultPolicy::Continue,
        }
    }
}

impl CaptureConfig {
    pub fn with_snaplen(mut self, snaplen: i32) -> Self {
        self.snaplen = snaplen;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_promiscuous(mut self, enable: bool) -> Self {
        self.promiscuous = enable;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: i32) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_immediate_mode(mut self, enable: bool) -> Self {
        self.immediate_mode = enable;
        self
    }

    pub fn with_filter<S: Into<String>>(mut self, bpf: S) -> Self {
        self.filter = Some(bpf.into());
        self
    }

    pub fn with_max_packets(mut self, count: u64) -> Self {
        self.max_packets = Some(count);
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Reject values libpcap or the dispatcher cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.snaplen <= 0 {
            return Err(Error::invalid_config(format!(
                "snaplen must be positive, got {}",
                self.snaplen
            )));
        }
        if self.timeout_ms <= 0 {
            return Err(Error::invalid_config(format!(
                "timeout must be positive, got {}ms",
                self.timeout_ms
            )));
        }
        if self.buffer_size < 0 {
            return Err(Error::invalid_config(format!(
                "buffer size must not be negative, got {}",
                self.buffer_size
            )));
        }
        if self.max_packets == Some(0) {
            return Err(Error::invalid_config("max_packets must be at least 1"));
        }
        Ok(())
    }
}

/// Channel capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCapacity {
    /// At most this many undelivered records
    Bounded(usize),
    /// No limit; memory grows with consumer lag
    Unbounded,
}

impl Default for ChannelCapacity {
    fn default() -> Self {
        ChannelCapacity::Bounded(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// What a bounded channel does when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Discard the packet being published and count it as a queue drop
    #[default]
    DropNewest,
    /// Hold the capture thread until the consumer frees a slot or the
    /// session stops. Packets pile up in the kernel buffer meanwhile.
    Block,
}

/// Configuration for channel delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelConfig {
    pub capacity: ChannelCapacity,
    pub backpressure: Backpressure,
}

impl ChannelConfig {
    /// Bounded channel with the default drop policy
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: ChannelCapacity::Bounded(capacity),
            backpressure: Backpressure::default(),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            capacity: ChannelCapacity::Unbounded,
            backpressure: Backpressure::default(),
        }
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn validate(&self) -> Result<()> {
        match self.capacity {
            ChannelCapacity::Bounded(0) => {
                Err(Error::invalid_config("channel capacity must be at least 1"))
            }
            ChannelCapacity::Bounded(n) if n > Semaphore::MAX_PERMITS => {
                Err(Error::invalid_config(format!(
                    "channel capacity must not exceed {}, got {}",
                    Semaphore::MAX_PERMITS,
                    n
                )))
            }
            _ => Ok(()),
        }
    }
}
