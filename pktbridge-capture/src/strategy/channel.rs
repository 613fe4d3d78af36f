//! Channel delivery: the capture thread publishes, a consumer drains

use bytes::Bytes;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

use pktbridge_core::{Error, PacketHeader, Result, Verdict};

use super::{DeliveryStrategy, DispatchContext};
use crate::config::{Backpressure, ChannelCapacity, ChannelConfig};
use crate::record::PacketRecord;

/// Pause between publish attempts while a bounded channel is full
const BLOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1);

enum Sender<C> {
    Bounded(mpsc::Sender<PacketRecord<C>>),
    Unbounded(mpsc::UnboundedSender<PacketRecord<C>>),
}

enum Receiver<C> {
    Bounded(mpsc::Receiver<PacketRecord<C>>),
    Unbounded(mpsc::UnboundedReceiver<PacketRecord<C>>),
}

/// Build a connected strategy/stream pair
///
/// Every record carries a clone of `context`.
pub fn channel<C>(
    config: &ChannelConfig,
    context: C,
) -> Result<(ChannelStrategy<C>, PacketStream<C>)>
where
    C: Clone + Send + 'static,
{
    config.validate()?;

    let (tx, rx) = match config.capacity {
        ChannelCapacity::Bounded(capacity) => {
            let (tx, rx) = mpsc::channel(capacity);
            (Sender::Bounded(tx), Receiver::Bounded(rx))
        }
        ChannelCapacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Sender::Unbounded(tx), Receiver::Unbounded(rx))
        }
    };

    let strategy = ChannelStrategy {
        tx,
        context,
        backpressure: config.backpressure,
        blocked_once: false,
    };
    Ok((strategy, PacketStream { rx }))
}

/// Publishes an owned copy of every packet to a [`PacketStream`]
///
/// The stream ends once this strategy is dropped, which happens when the
/// capture loop finishes.
pub struct ChannelStrategy<C> {
    tx: Sender<C>,
    context: C,
    backpressure: Backpressure,
    blocked_once: bool,
}

impl<C: Clone + Send + 'static> ChannelStrategy<C> {
    fn publish(&mut self, record: PacketRecord<C>, ctx: &DispatchContext) -> Result<bool> {
        let tx = match &self.tx {
            Sender::Unbounded(tx) => {
                return tx.send(record).map(|_| true).map_err(|_| Error::QueueClosed);
            }
            Sender::Bounded(tx) => tx,
        };

        let mut record = record;
        loop {
            match tx.try_send(record) {
                Ok(()) => return Ok(true),
                Err(TrySendError::Closed(_)) => return Err(Error::QueueClosed),
                Err(TrySendError::Full(returned)) => match self.backpressure {
                    Backpressure::DropNewest => return Ok(false),
                    Backpressure::Block => {
                        if !self.blocked_once {
                            self.blocked_once = true;
                            warn!("Packet channel full, capture thread blocks on the consumer");
                        }
                        if ctx.is_stopped() {
                            return Ok(false);
                        }
                        record = returned;
                        thread::sleep(BLOCK_RETRY_INTERVAL);
                    }
                },
            }
        }
    }
}

impl<C: Clone + Send + 'static> DeliveryStrategy for ChannelStrategy<C> {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn deliver(&mut self, header: PacketHeader, data: &[u8], ctx: &DispatchContext) -> Verdict {
        let data = Bytes::copy_from_slice(data);
        let record = PacketRecord::new(header, data, self.context.clone());

        match self.publish(record, ctx) {
            Ok(true) => {
                ctx.stats().record_delivered();
                Verdict::Continue
            }
            Ok(false) => {
                ctx.stats().record_queue_drop();
                Verdict::Continue
            }
            Err(e) => {
                debug!(error = %e, "Packet consumer gone, stopping delivery");
                ctx.stats().record_queue_drop();
                Verdict::Stop
            }
        }
    }
}

/// Consumer side of channel delivery
///
/// Records arrive in capture order. After the capture loop ends the
/// remaining records are still delivered, then every receive returns `None`.
pub struct PacketStream<C = ()> {
    rx: Receiver<C>,
}

impl<C> PacketStream<C> {
    /// Wait for the next record
    pub async fn recv(&mut self) -> Option<PacketRecord<C>> {
        match &mut self.rx {
            Receiver::Bounded(rx) => rx.recv().await,
            Receiver::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Wait for the next record from synchronous code
    ///
    /// Panics when called from within an async runtime, like
    /// `tokio::sync::mpsc::Receiver::blocking_recv`.
    pub fn blocking_recv(&mut self) -> Option<PacketRecord<C>> {
        match &mut self.rx {
            Receiver::Bounded(rx) => rx.blocking_recv(),
            Receiver::Unbounded(rx) => rx.blocking_recv(),
        }
    }

    /// Take a record if one is ready
    ///
    /// `Ok(None)` means nothing is queued right now; `Err(Error::QueueClosed)`
    /// means the capture loop ended and everything was drained.
    pub fn try_recv(&mut self) -> Result<Option<PacketRecord<C>>> {
        let result = match &mut self.rx {
            Receiver::Bounded(rx) => rx.try_recv(),
            Receiver::Unbounded(rx) => rx.try_recv(),
        };
        match result {
            Ok(record) => Ok(Some(record)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::QueueClosed),
        }
    }

    /// Receive until the capture loop ends, returning everything in order
    pub async fn collect_all(mut self) -> Vec<PacketRecord<C>> {
        let mut records = Vec::new();
        while let Some(record) = self.recv().await {
            records.push(record);
        }
        records
    }

    /// Stop accepting records; ones already queued can still be received
    ///
    /// The capture side sees the closed queue on its next publish and ends
    /// the loop.
    pub fn close(&mut self) {
        match &mut self.rx {
            Receiver::Bounded(rx) => rx.close(),
            Receiver::Unbounded(rx) => rx.close(),
        }
    }

    /// Iterate with [`blocking_recv`](Self::blocking_recv)
    pub fn blocking_iter(&mut self) -> BlockingIter<'_, C> {
        BlockingIter { stream: self }
    }
}

/// Blocking iterator over a [`PacketStream`]
pub struct BlockingIter<'s, C> {
    stream: &'s mut PacketStream<C>,
}

impl<C> Iterator for BlockingIter<'_, C> {
    type Item = PacketRecord<C>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.blocking_recv()
    }
}
