//! Bridge from libpcap's packet callback to Rust consumers
//!
//! libpcap pushes every packet through a C callback on the capture thread,
//! with a buffer that is reused as soon as the callback returns. This crate
//! provides that callback ([`packet_trampoline`]) and three ways to get the
//! packet to application code:
//!
//! - **Channel**: an owned copy is queued; a consumer reads a
//!   [`PacketStream`] from any thread or task
//! - **Loop**: a handler runs on the capture thread with an owned copy
//! - **Alloc-less loop**: a handler runs on the capture thread with a
//!   [`PacketView`] borrowing the engine's buffer, valid for one call
//!
//! A [`CaptureSession`] owns the [`PacketSource`], runs the capture loop on
//! a dedicated thread and tracks [`CaptureStats`].
//!
//! ## Example
//!
//! ```no_run
//! use pktbridge_capture::{CaptureConfig, CaptureSession, ChannelConfig, LiveSource};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig::default().with_filter("udp");
//! let source = LiveSource::open("eth0", &config)?;
//! let mut session = CaptureSession::with_config(source, config)?;
//! let link = session.link_type();
//!
//! let mut stream = session.start_channel(ChannelConfig::default(), ())?;
//! session.stop_handle().stop_after(std::time::Duration::from_secs(5));
//!
//! while let Some(record) = stream.recv().await {
//!     if let Some(Ok(udp)) = link.map(|l| record.transport(l)) {
//!         println!("{}", udp);
//!     }
//! }
//! session.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod record;
pub mod session;
pub mod source;
pub mod stats;
pub mod strategy;
pub mod trampoline;

// Re-export main types
pub use config::{
    Backpressure, CaptureConfig, ChannelCapacity, ChannelConfig, FaultPolicy,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use record::{PacketRecord, PacketView};
pub use session::{CaptureSession, CaptureState};
pub use source::{LiveSource, MemorySource, NextPacket, PacketSource};
pub use stats::{CaptureStats, EngineStats, StatsAccumulator};
pub use strategy::{
    channel, AllocLessStrategy, BlockingIter, ChannelStrategy, DeliveryStrategy,
    DispatchContext, LoopStrategy, PacketStream,
};
pub use trampoline::{packet_trampoline, Dispatcher, StopHandle};

pub use pktbridge_core::{Error, PacketHeader, Result, Verdict};
pub use pktbridge_packet::LinkType;
