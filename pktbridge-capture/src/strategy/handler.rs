//! Strategies that call a handler directly on the capture thread

use bytes::Bytes;
use pktbridge_core::{PacketHeader, Verdict};

use super::{DeliveryStrategy, DispatchContext};
use crate::record::{PacketRecord, PacketView};

/// Calls `handler` with an owned copy of every packet
///
/// The copy may be kept or sent elsewhere. The handler blocks the capture
/// loop while it runs.
pub struct LoopStrategy<F> {
    handler: F,
}

impl<F> LoopStrategy<F>
where
    F: FnMut(PacketRecord) -> Verdict,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> DeliveryStrategy for LoopStrategy<F>
where
    F: FnMut(PacketRecord) -> Verdict,
{
    fn name(&self) -> &'static str {
        "loop"
    }

    fn deliver(&mut self, header: PacketHeader, data: &[u8], ctx: &DispatchContext) -> Verdict {
        let record = PacketRecord::new(header, Bytes::copy_from_slice(data), ());
        let verdict = (self.handler)(record);
        ctx.stats().record_delivered();
        verdict
    }
}

/// Calls `handler` with a borrowed view and allocates nothing per packet
///
/// The handler is generic over the view's lifetime, so the view cannot be
/// stored or moved out of the call:
///
/// ```compile_fail
/// use pktbridge_capture::{AllocLessStrategy, PacketView, Verdict};
///
/// let mut kept: Vec<PacketView<'static>> = Vec::new();
/// let _strategy = AllocLessStrategy::new(move |view| {
///     kept.push(view);
///     Verdict::Continue
/// });
/// ```
///
/// Use [`PacketView::to_record`] to keep a copy.
pub struct AllocLessStrategy<F> {
    handler: F,
    /// Header slot, overwritten for every packet
    slot: PacketHeader,
}

impl<F> AllocLessStrategy<F>
where
    F: for<'a> FnMut(PacketView<'a>) -> Verdict,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            slot: PacketHeader::default(),
        }
    }
}

impl<F> DeliveryStrategy for AllocLessStrategy<F>
where
    F: for<'a> FnMut(PacketView<'a>) -> Verdict,
{
    fn name(&self) -> &'static str {
        "alloc-less loop"
    }

    fn deliver(&mut self, header: PacketHeader, data: &[u8], ctx: &DispatchContext) -> Verdict {
        self.slot = header;
        let verdict = (self.handler)(PacketView::new(&self.slot, data));
        ctx.stats().record_delivered();
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsAccumulator;
    use crate::trampoline::StopHandle;

    fn ctx() -> DispatchContext {
        DispatchContext::new(StopHandle::new(), StatsAccumulator::new())
    }

    #[test]
    fn test_loop_strategy_owns_copy() {
        let mut seen = Vec::new();
        let ctx = ctx();
        {
            let mut strategy = LoopStrategy::new(|record: PacketRecord| {
                seen.push(record);
                Verdict::Continue
            });
            let mut buffer = vec![1u8, 2, 3];
            let header = PacketHeader::new(10, 0, 3, 3);
            assert_eq!(strategy.deliver(header, &buffer, &ctx), Verdict::Continue);

            // The engine reuses its buffer for the next packet
            buffer.copy_from_slice(&[9, 9, 9]);
            strategy.deliver(header, &buffer, &ctx);
        }

        assert_eq!(seen.len(), 2);
        assert_eq!(&seen[0].data[..], &[1, 2, 3]);
        assert_eq!(&seen[1].data[..], &[9, 9, 9]);
        assert_eq!(ctx.stats().packets_delivered(), 2);
    }

    #[test]
    fn test_loop_strategy_verdict() {
        let ctx = ctx();
        let mut count = 0;
        let mut strategy = LoopStrategy::new(move |_record| {
            count += 1;
            Verdict::from(count == 2)
        });
        let header = PacketHeader::default();

        assert_eq!(strategy.deliver(header, &[], &ctx), Verdict::Continue);
        assert_eq!(strategy.deliver(header, &[], &ctx), Verdict::Stop);
    }

    #[test]
    fn test_alloc_less_reuses_slot() {
        let ctx = ctx();
        let mut lens = Vec::new();
        let mut kept = Vec::new();
        {
            let mut strategy = AllocLessStrategy::new(|view: PacketView<'_>| {
                lens.push((view.header().caplen, view.len()));
                if view.data().first() == Some(&0xAA) {
                    kept.push(view.to_record());
                }
                Verdict::Continue
            });

            strategy.deliver(PacketHeader::new(1, 0, 2, 2), &[0xAA, 0x01], &ctx);
            strategy.deliver(PacketHeader::new(2, 0, 1, 64), &[0xBB], &ctx);
            assert_eq!(strategy.slot.caplen, 1);
            assert_eq!(strategy.slot.len, 64);
        }

        assert_eq!(lens, vec![(2, 2), (1, 1)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(&kept[0].data[..], &[0xAA, 0x01]);
        assert_eq!(ctx.stats().packets_delivered(), 2);
    }
}
