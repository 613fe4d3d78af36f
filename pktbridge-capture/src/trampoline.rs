//! The native callback entry point
//!
//! libpcap hands every packet to a `pcap_handler`:
//!
//! ```text
//! void handler(u_char *user, const struct pcap_pkthdr *h, const u_char *bytes);
//! ```
//!
//! [`packet_trampoline`] has exactly that shape. It is instantiated once per
//! strategy type, so the strategy call is resolved at compile time. `user`
//! must point at the [`Dispatcher`] for that strategy. The header and bytes
//! belong to the engine and are only valid until the trampoline returns.
//!
//! [`CaptureSession`](crate::CaptureSession) pulls packets with
//! `pcap_next_ex` and calls the trampoline itself, since the `pcap` crate
//! has no callback loop. The function can equally be passed to `pcap_loop`.

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use pktbridge_core::{Error, PacketHeader, Verdict};

use crate::config::FaultPolicy;
use crate::stats::StatsAccumulator;
use crate::strategy::{DeliveryStrategy, DispatchContext};

/// Requests the end of a capture run from any thread
///
/// Once stopped, the dispatcher delivers no further packets, even if the
/// engine still has some buffered.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Stop after `delay` from a background thread
    pub fn stop_after(&self, delay: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            debug!(?delay, "Delayed stop fired");
            handle.stop();
        })
    }
}

/// Per-run state the trampoline forwards into
///
/// Only the capture thread touches a dispatcher. The parts it shares with
/// the session (stop flag, counters) are atomic.
pub struct Dispatcher<S> {
    strategy: S,
    ctx: DispatchContext,
    fault_policy: FaultPolicy,
    max_packets: Option<u64>,
    dispatched: u64,
}

impl<S: DeliveryStrategy> Dispatcher<S> {
    pub fn new(strategy: S, stop: StopHandle, stats: StatsAccumulator) -> Self {
        Self {
            strategy,
            ctx: DispatchContext::new(stop, stats),
            fault_policy: FaultPolicy::default(),
            max_packets: None,
            dispatched: 0,
        }
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Stop the run after `count` packets were dispatched
    pub fn with_max_packets(mut self, count: Option<u64>) -> Self {
        self.max_packets = count;
        self
    }

    /// The `user` argument to pass alongside [`packet_trampoline::<S>`]
    ///
    /// The pointer is valid as long as the dispatcher is neither moved nor
    /// dropped.
    pub fn user_ptr(&mut self) -> *mut u8 {
        self as *mut Self as *mut u8
    }

    pub fn is_stopped(&self) -> bool {
        self.ctx.is_stopped()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Packets dispatched so far in this run
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn stats(&self) -> &StatsAccumulator {
        self.ctx.stats()
    }

    fn deliver(&mut self, header: PacketHeader, data: &[u8]) -> Verdict {
        self.ctx.stats().record_captured(data.len());
        self.strategy.deliver(header, data, &self.ctx)
    }

    /// Turn the outcome of one delivery into loop control
    fn settle(&mut self, outcome: std::thread::Result<Verdict>) {
        self.dispatched += 1;

        let verdict = match outcome {
            Ok(verdict) => verdict,
            Err(payload) => {
                let err = Error::handler_fault(panic_message(payload.as_ref()));
                self.ctx.stats().record_fault();
                warn!(
                    strategy = self.strategy.name(),
                    error = %err,
                    policy = ?self.fault_policy,
                    "Packet handler panicked"
                );
                match self.fault_policy {
                    FaultPolicy::Continue => Verdict::Continue,
                    FaultPolicy::Stop => Verdict::Stop,
                }
            }
        };

        let limit_reached = self.max_packets.is_some_and(|max| self.dispatched >= max);
        if verdict.is_stop() || limit_reached {
            debug!(
                dispatched = self.dispatched,
                limit_reached, "Capture loop stop requested"
            );
            self.ctx.stop_handle().stop();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The `pcap_handler` compatible entry point
///
/// Copies the native header into a [`PacketHeader`], forms a slice over the
/// `caplen` captured bytes and hands both to the dispatcher's strategy. No
/// panic crosses this function: a panicking handler is caught here and
/// handled according to the dispatcher's [`FaultPolicy`]. A panic anywhere
/// else on the way (logging, dropping the handler's panic payload) is
/// swallowed and ends the run. Null pointers are logged and the packet is
/// skipped.
///
/// # Safety
///
/// `user` must be the value returned by [`Dispatcher::user_ptr`] for a live
/// `Dispatcher<S>` that nothing else accesses during the call. If non-null,
/// `header` must point to a valid `pcap_pkthdr` and `bytes` to at least
/// `caplen` readable bytes, both valid until the function returns.
pub unsafe extern "C" fn packet_trampoline<S: DeliveryStrategy>(
    user: *mut u8,
    header: *const pcap::PacketHeader,
    bytes: *const u8,
) {
    let guarded = panic::catch_unwind(AssertUnwindSafe(|| dispatch::<S>(user, header, bytes)));
    if let Err(payload) = guarded {
        // Dropping it could panic again
        mem::forget(payload);
        if !user.is_null() {
            // SAFETY: same pointer as above; the stop flag is atomic
            let dispatcher = &*(user as *const Dispatcher<S>);
            dispatcher.ctx.stop_handle().stop();
        }
    }
}

unsafe fn dispatch<S: DeliveryStrategy>(
    user: *mut u8,
    header: *const pcap::PacketHeader,
    bytes: *const u8,
) {
    if user.is_null() {
        warn!("Capture callback without dispatcher");
        return;
    }
    // SAFETY: caller guarantees `user` came from `Dispatcher::<S>::user_ptr`
    let dispatcher = &mut *(user as *mut Dispatcher<S>);

    if header.is_null() {
        warn!("Capture callback without packet header");
        dispatcher.stats().record_skipped();
        return;
    }
    // SAFETY: non-null and valid for the duration of the call
    let native = &*header;

    if dispatcher.is_stopped() {
        return;
    }

    let caplen = native.caplen as usize;
    let data: &[u8] = if caplen == 0 {
        &[]
    } else if bytes.is_null() {
        warn!(caplen, "Capture callback without packet data");
        dispatcher.stats().record_skipped();
        return;
    } else {
        // SAFETY: the engine provides `caplen` readable bytes at `bytes`
        slice::from_raw_parts(bytes, caplen)
    };

    let header = PacketHeader::new(
        i64::from(native.ts.tv_sec),
        i64::from(native.ts.tv_usec),
        native.caplen,
        native.len,
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| dispatcher.deliver(header, data)));
    dispatcher.settle(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PacketRecord;
    use crate::strategy::LoopStrategy;
    use parking_lot::Mutex;
    use std::ptr;

    fn native_header(sec: i64, caplen: u32, len: u32) -> pcap::PacketHeader {
        pcap::PacketHeader {
            ts: libc::timeval {
                tv_sec: sec as libc::time_t,
                tv_usec: 250_000,
            },
            caplen,
            len,
        }
    }

    type Collected = Arc<Mutex<Vec<PacketRecord>>>;

    fn collecting_dispatcher() -> (Dispatcher<impl DeliveryStrategy>, Collected) {
        let seen: Collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let strategy = LoopStrategy::new(move |record: PacketRecord| {
            sink.lock().push(record);
            Verdict::Continue
        });
        let dispatcher = Dispatcher::new(strategy, StopHandle::new(), StatsAccumulator::new());
        (dispatcher, seen)
    }

    type Callback = unsafe extern "C" fn(*mut u8, *const pcap::PacketHeader, *const u8);

    fn trampoline_for<S: DeliveryStrategy>(_: &Dispatcher<S>) -> Callback {
        packet_trampoline::<S>
    }

    unsafe fn call<S: DeliveryStrategy>(
        d: &mut Dispatcher<S>,
        hdr: &pcap::PacketHeader,
        data: &[u8],
    ) {
        packet_trampoline::<S>(d.user_ptr(), hdr, data.as_ptr());
    }

    #[test]
    fn test_trampoline_forwards() {
        let (mut dispatcher, seen) = collecting_dispatcher();
        let hdr = native_header(1_700_000_000, 4, 60);
        let data = [0xDE, 0xAD, 0xBE, 0xEF];

        unsafe { call(&mut dispatcher, &hdr, &data) };

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(&seen[0].data[..], &data);
        assert_eq!(seen[0].header.caplen, 4);
        assert_eq!(seen[0].header.len, 60);
        assert_eq!(seen[0].header.ts_sec(), 1_700_000_000);
        assert_eq!(seen[0].header.ts_nanos(), 250_000_000);
        assert_eq!(dispatcher.stats().packets_captured(), 1);
        assert_eq!(dispatcher.dispatched(), 1);
    }

    #[test]
    fn test_trampoline_ignores_null() {
        let (mut dispatcher, seen) = collecting_dispatcher();
        let hdr = native_header(1, 4, 4);

        let callback = trampoline_for(&dispatcher);
        let user = dispatcher.user_ptr();
        unsafe {
            callback(ptr::null_mut(), &hdr, ptr::null());
            callback(user, ptr::null(), ptr::null());
            callback(user, &hdr, ptr::null());
        }

        assert!(seen.lock().is_empty());
        assert_eq!(dispatcher.stats().snapshot().packets_skipped, 2);
    }

    #[test]
    fn test_trampoline_catches_panic() {
        let stats = StatsAccumulator::new();
        let stop = StopHandle::new();
        let mut count = 0;
        let strategy = LoopStrategy::new(move |_record: PacketRecord| {
            count += 1;
            if count == 2 {
                panic!("handler failed on packet {}", count);
            }
            Verdict::Continue
        });
        let mut dispatcher = Dispatcher::new(strategy, stop.clone(), stats.clone());
        let hdr = native_header(1, 1, 1);

        for _ in 0..3 {
            unsafe { call(&mut dispatcher, &hdr, &[0]) };
        }

        assert_eq!(stats.handler_faults(), 1);
        assert_eq!(stats.packets_delivered(), 2);
        assert_eq!(stats.packets_captured(), 3);
        assert!(!stop.is_stopped());
    }

    #[test]
    fn test_fault_policy_stop() {
        let stop = StopHandle::new();
        let strategy = LoopStrategy::new(|_record: PacketRecord| -> Verdict { panic!("boom") });
        let mut dispatcher = Dispatcher::new(strategy, stop.clone(), StatsAccumulator::new())
            .with_fault_policy(FaultPolicy::Stop);
        let hdr = native_header(1, 1, 1);

        unsafe { call(&mut dispatcher, &hdr, &[0]) };
        assert!(stop.is_stopped());

        // Nothing is delivered once stopped
        unsafe { call(&mut dispatcher, &hdr, &[0]) };
        assert_eq!(dispatcher.stats().packets_captured(), 1);
    }

    #[test]
    fn test_handler_stop_and_limit() {
        let (dispatcher, seen) = collecting_dispatcher();
        let stop = dispatcher.ctx.stop_handle().clone();
        let mut dispatcher = dispatcher.with_max_packets(Some(2));
        let hdr = native_header(1, 1, 1);

        for _ in 0..5 {
            unsafe { call(&mut dispatcher, &hdr, &[7]) };
        }

        assert!(stop.is_stopped());
        assert_eq!(seen.lock().len(), 2);
    }

    struct PanicOnDrop;

    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            panic!("payload drop failed");
        }
    }

    #[test]
    fn test_payload_drop_panic_is_contained() {
        let stop = StopHandle::new();
        let strategy = LoopStrategy::new(|_record: PacketRecord| -> Verdict {
            panic::panic_any(PanicOnDrop)
        });
        let mut dispatcher = Dispatcher::new(strategy, stop.clone(), StatsAccumulator::new());
        let hdr = native_header(1, 1, 1);

        // Returns normally even though the fault handling itself panicked
        unsafe { call(&mut dispatcher, &hdr, &[0]) };

        assert_eq!(dispatcher.stats().handler_faults(), 1);
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_stop_after() {
        let stop = StopHandle::new();
        let timer = stop.stop_after(Duration::from_millis(20));
        assert!(!stop.is_stopped());
        timer.join().unwrap();
        assert!(stop.is_stopped());
    }
}
