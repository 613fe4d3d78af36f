//! Delivery strategies
//!
//! A strategy decides what happens to a packet once the trampoline has
//! received it. Exactly one strategy serves a capture run:
//!
//! - [`ChannelStrategy`] copies each packet into a queue drained by an
//!   independent consumer
//! - [`LoopStrategy`] calls a handler on the capture thread with an owned copy
//! - [`AllocLessStrategy`] calls a handler on the capture thread with a view
//!   into the engine's buffer
//!
//! All of them run on the capture thread. The loop does not fetch the next
//! packet until [`DeliveryStrategy::deliver`] returns.

mod channel;
mod handler;

pub use channel::{channel, BlockingIter, ChannelStrategy, PacketStream};
pub use handler::{AllocLessStrategy, LoopStrategy};

use pktbridge_core::{PacketHeader, Verdict};

use crate::stats::StatsAccumulator;
use crate::trampoline::StopHandle;

/// Session state a strategy may consult while delivering
#[derive(Debug, Clone)]
pub struct DispatchContext {
    stop: StopHandle,
    stats: StatsAccumulator,
}

impl DispatchContext {
    pub fn new(stop: StopHandle, stats: StatsAccumulator) -> Self {
        Self { stop, stats }
    }

    /// True once a stop was requested for the run
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_handle(&self) -> &StopHandle {
        &self.stop
    }

    pub fn stats(&self) -> &StatsAccumulator {
        &self.stats
    }
}

/// One way of handing packets to application code
///
/// `data` is only valid for the duration of the call. Implementations that
/// need the bytes afterwards must copy them. A session additionally requires
/// `Send + 'static` since the strategy moves to the capture thread.
pub trait DeliveryStrategy {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Deliver one packet; `Verdict::Stop` ends the capture loop
    fn deliver(&mut self, header: PacketHeader, data: &[u8], ctx: &DispatchContext) -> Verdict;
}
