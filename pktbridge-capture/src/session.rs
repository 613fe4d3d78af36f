//! Capture session: runs the capture loop on its own thread

use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pktbridge_core::{Error, Result, Verdict};
use pktbridge_packet::LinkType;

use crate::config::{CaptureConfig, ChannelConfig};
use crate::record::{PacketRecord, PacketView};
use crate::source::{NextPacket, PacketSource};
use crate::stats::{CaptureStats, StatsAccumulator};
use crate::strategy::{channel, AllocLessStrategy, DeliveryStrategy, LoopStrategy, PacketStream};
use crate::trampoline::{packet_trampoline, Dispatcher, StopHandle};

/// State of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No capture thread
    Stopped,
    /// The capture loop is delivering packets
    Running,
    /// The loop ended on its own (source exhausted, handler stop, packet
    /// limit, engine error); `stop()` or `wait()` collects the thread
    Finished,
}

/// Drives one [`PacketSource`] through one delivery strategy at a time
///
/// ```no_run
/// use pktbridge_capture::{CaptureConfig, CaptureSession, LiveSource, PacketSource, Verdict};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CaptureConfig::default().with_filter("tcp");
/// let source = LiveSource::open("eth0", &config)?;
/// let link = source.link_type();
/// let mut session = CaptureSession::with_config(source, config)?;
///
/// session.start_loop_allocless(move |view| {
///     if let Some(Ok(tcp)) = link.map(|l| view.transport(l)) {
///         println!("{}", tcp);
///     }
///     Verdict::Continue
/// })?;
///
/// // Later, stop the capture
/// session.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct CaptureSession<P> {
    id: Uuid,
    config: CaptureConfig,
    /// Present while no capture thread owns it
    source: Option<P>,
    description: String,
    link: Option<LinkType>,
    worker: Option<JoinHandle<P>>,
    state: Arc<RwLock<CaptureState>>,
    stop: StopHandle,
    stats: StatsAccumulator,
}

impl<P> CaptureSession<P>
where
    P: PacketSource + Send + 'static,
{
    /// Create a session with the default configuration
    pub fn new(source: P) -> Self {
        let id = Uuid::now_v7();
        let description = source.describe();
        info!(session = %id, source = %description, "Created capture session");

        Self {
            id,
            config: CaptureConfig::default(),
            link: source.link_type(),
            source: Some(source),
            description,
            worker: None,
            state: Arc::new(RwLock::new(CaptureState::Stopped)),
            stop: StopHandle::new(),
            stats: StatsAccumulator::new(),
        }
    }

    /// Create a session with custom configuration
    ///
    /// Only `max_packets` and `fault_policy` matter here; the remaining
    /// fields apply when opening a [`LiveSource`](crate::LiveSource).
    pub fn with_config(source: P, config: CaptureConfig) -> Result<Self> {
        config.validate()?;
        let mut session = Self::new(source);
        session.config = config;
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Datalink type of the source, for [`PacketRecord::transport`]
    pub fn link_type(&self) -> Option<LinkType> {
        self.link
    }

    /// The source, unless a capture thread currently owns it
    pub fn source(&self) -> Option<&P> {
        self.source.as_ref()
    }

    /// Get current capture state
    pub fn state(&self) -> CaptureState {
        *self.state.read()
    }

    /// Check if capture is running
    pub fn is_running(&self) -> bool {
        self.state() == CaptureState::Running
    }

    /// Get statistics of the current or last run
    pub fn stats(&self) -> CaptureStats {
        self.stats.snapshot()
    }

    /// Handle that stops the current run, or the next one if none is active
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Start capturing with a caller-supplied strategy
    pub fn start<S>(&mut self, strategy: S) -> Result<()>
    where
        S: DeliveryStrategy + Send + 'static,
    {
        if self.worker.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let source = self
            .source
            .take()
            .ok_or_else(|| Error::capture("Packet source was lost by a previous run"))?;

        self.stats.reset();
        let dispatcher = Dispatcher::new(strategy, self.stop.clone(), self.stats.clone())
            .with_fault_policy(self.config.fault_policy)
            .with_max_packets(self.config.max_packets);
        let strategy_name = dispatcher.strategy_name();

        *self.state.write() = CaptureState::Running;

        let state = Arc::clone(&self.state);
        let id = self.id;
        let spawned = thread::Builder::new()
            .name("pktbridge-capture".to_string())
            .spawn(move || run_capture(source, dispatcher, state, id));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                info!(
                    session = %self.id,
                    strategy = strategy_name,
                    source = %self.description,
                    "Starting packet capture"
                );
                Ok(())
            }
            Err(e) => {
                *self.state.write() = CaptureState::Stopped;
                error!(session = %self.id, error = %e, "Failed to spawn capture thread");
                Err(e.into())
            }
        }
    }

    /// Start channel delivery; records are read from the returned stream
    pub fn start_channel<C>(
        &mut self,
        config: ChannelConfig,
        context: C,
    ) -> Result<PacketStream<C>>
    where
        C: Clone + Send + 'static,
    {
        let (strategy, stream) = channel(&config, context)?;
        self.start(strategy)?;
        Ok(stream)
    }

    /// Start loop delivery; `handler` gets an owned copy of each packet
    pub fn start_loop<F>(&mut self, handler: F) -> Result<()>
    where
        F: FnMut(PacketRecord) -> Verdict + Send + 'static,
    {
        self.start(LoopStrategy::new(handler))
    }

    /// Start alloc-less delivery; `handler` gets a view valid for one call
    pub fn start_loop_allocless<F>(&mut self, handler: F) -> Result<()>
    where
        F: for<'a> FnMut(PacketView<'a>) -> Verdict + Send + 'static,
    {
        self.start(AllocLessStrategy::new(handler))
    }

    /// Stop packet capture and wait for the capture thread
    ///
    /// Returns once no handler runs anymore. A channel consumer still
    /// receives what was queued before the stop. The capture thread sees
    /// the request between reads, so on an idle source this takes up to
    /// one read timeout ([`CaptureConfig::timeout_ms`] for a live capture).
    pub fn stop(&mut self) -> Result<()> {
        if self.worker.is_none() {
            return Ok(());
        }
        info!(session = %self.id, "Stopping packet capture");
        self.stop.stop();
        self.join()
    }

    /// Wait for the capture loop to end on its own
    ///
    /// Never returns for a source that does not run dry unless something
    /// else stops the run.
    pub fn wait(&mut self) -> Result<()> {
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };

        let result = match handle.join() {
            Ok(source) => {
                self.source = Some(source);
                Ok(())
            }
            Err(_) => {
                error!(session = %self.id, "Capture thread panicked");
                Err(Error::capture("Capture thread panicked"))
            }
        };

        self.stop = StopHandle::new();
        *self.state.write() = CaptureState::Stopped;
        debug!(session = %self.id, "Capture thread joined");
        result
    }
}

impl<P> Drop for CaptureSession<P> {
    fn drop(&mut self) {
        // Ensure capture is stopped when dropped
        self.stop.stop();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Body of the capture thread; hands the source back when done
fn run_capture<P, S>(
    mut source: P,
    mut dispatcher: Dispatcher<S>,
    state: Arc<RwLock<CaptureState>>,
    id: Uuid,
) -> P
where
    P: PacketSource,
    S: DeliveryStrategy,
{
    loop {
        if dispatcher.is_stopped() {
            debug!(session = %id, "Capture stopped");
            break;
        }

        match source.next_packet() {
            Ok(NextPacket::Packet(packet)) => {
                let caplen = packet.header.caplen as usize;
                if caplen > packet.data.len() {
                    warn!(
                        session = %id,
                        caplen,
                        available = packet.data.len(),
                        "Captured length exceeds packet data, skipping"
                    );
                    dispatcher.stats().record_skipped();
                    continue;
                }
                // SAFETY: the header and data borrow from the source and stay
                // valid for the call; the dispatcher lives on this stack frame
                // and is not otherwise accessed while the trampoline runs.
                let user = dispatcher.user_ptr();
                unsafe {
                    packet_trampoline::<S>(user, packet.header, packet.data.as_ptr());
                }
            }
            Ok(NextPacket::Timeout) => continue,
            Ok(NextPacket::Exhausted) => {
                debug!(session = %id, "Packet source exhausted");
                break;
            }
            Err(e) => {
                error!(session = %id, error = %e, "Packet capture error");
                break;
            }
        }
    }

    dispatcher.stats().finish();
    if let Some(engine) = source.engine_stats() {
        dispatcher.stats().record_engine(engine);
    }
    let dispatched = dispatcher.dispatched();
    // Dropping the strategy closes a channel, ending the consumer's stream
    drop(dispatcher);

    {
        let mut state = state.write();
        if *state == CaptureState::Running {
            *state = CaptureState::Finished;
        }
    }
    info!(session = %id, dispatched, "Capture thread finished");
    source
}
