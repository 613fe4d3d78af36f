//! Capture statistics and metrics

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters reported by the capture engine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Packets received by the filter
    pub received: u64,
    /// Packets dropped because the engine buffer was full
    pub dropped: u64,
    /// Packets dropped by the interface
    pub if_dropped: u64,
}

impl From<pcap::Stat> for EngineStats {
    fn from(stat: pcap::Stat) -> Self {
        Self {
            received: u64::from(stat.received),
            dropped: u64::from(stat.dropped),
            if_dropped: u64::from(stat.if_dropped),
        }
    }
}

/// Statistics for one capture run
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    /// Packets that reached the dispatcher
    pub packets_captured: u64,
    /// Packets handed to a handler or queued for the consumer
    pub packets_delivered: u64,
    /// Packets discarded because the channel was full or closed
    pub queue_dropped: u64,
    /// Handler panics caught at the callback boundary
    pub handler_faults: u64,
    /// Packets the loop skipped (null pointers, inconsistent lengths)
    pub packets_skipped: u64,
    /// Total captured bytes
    pub bytes_captured: u64,
    /// Engine counters, filled in when the capture loop ends
    pub engine: Option<EngineStats>,
    /// Capture duration
    pub duration: Duration,
    /// Packets per second
    pub packets_per_second: f64,
    /// Bytes per second
    pub bytes_per_second: f64,
}

impl CaptureStats {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of captured packets that never reached the consumer, in percent
    pub fn drop_rate(&self) -> f64 {
        if self.packets_captured == 0 {
            return 0.0;
        }
        (self.queue_dropped as f64 / self.packets_captured as f64) * 100.0
    }

    /// Share of packets the engine reports as dropped, in percent
    pub fn engine_drop_rate(&self) -> f64 {
        match self.engine {
            Some(e) if e.received > 0 => (e.dropped as f64 / e.received as f64) * 100.0,
            _ => 0.0,
        }
    }

    /// Check if there are significant drops
    pub fn has_significant_drops(&self, threshold_percent: f64) -> bool {
        self.drop_rate() > threshold_percent || self.engine_drop_rate() > threshold_percent
    }

    /// Packets lost anywhere between the engine and the consumer
    pub fn total_lost(&self) -> u64 {
        let engine = self.engine.map_or(0, |e| e.dropped + e.if_dropped);
        engine + self.queue_dropped
    }

    /// Format statistics as human-readable string
    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Captured: {} packets ({} bytes)",
            self.packets_captured, self.bytes_captured
        )?;
        writeln!(f, "Delivered: {} packets", self.packets_delivered)?;
        writeln!(
            f,
            "Queue dropped: {} packets ({:.2}%)",
            self.queue_dropped,
            self.drop_rate()
        )?;
        writeln!(
            f,
            "Handler faults: {}, skipped: {}",
            self.handler_faults, self.packets_skipped
        )?;
        if let Some(engine) = self.engine {
            writeln!(
                f,
                "Engine: {} received, {} dropped, {} if-dropped",
                engine.received, engine.dropped, engine.if_dropped
            )?;
        }
        write!(
            f,
            "Duration: {:.2}s\nRate: {:.2} pps, {:.2} KB/s",
            self.duration.as_secs_f64(),
            self.packets_per_second,
            self.bytes_per_second / 1024.0
        )
    }
}

#[derive(Debug)]
struct Counters {
    captured: AtomicU64,
    delivered: AtomicU64,
    queue_dropped: AtomicU64,
    handler_faults: AtomicU64,
    skipped: AtomicU64,
    bytes: AtomicU64,
    engine: Mutex<Option<EngineStats>>,
    start_time: Mutex<Instant>,
    end_time: Mutex<Option<Instant>>,
}

/// Thread-safe statistics accumulator shared by the session and its
/// capture thread
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    inner: Arc<Counters>,
}

impl StatsAccumulator {
    /// Create a new statistics accumulator
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Counters {
                captured: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                queue_dropped: AtomicU64::new(0),
                handler_faults: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                bytes: AtomicU64::new(0),
                engine: Mutex::new(None),
                start_time: Mutex::new(Instant::now()),
                end_time: Mutex::new(None),
            }),
        }
    }

    /// Record a packet entering the dispatcher
    pub fn record_captured(&self, size: usize) {
        self.inner.captured.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_drop(&self) {
        self.inner.queue_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.inner.handler_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.inner.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Store the engine's counters
    pub fn record_engine(&self, engine: EngineStats) {
        *self.inner.engine.lock() = Some(engine);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> CaptureStats {
        let c = &self.inner;
        let packets_captured = c.captured.load(Ordering::Relaxed);
        let bytes_captured = c.bytes.load(Ordering::Relaxed);
        let duration = self.elapsed();

        let secs = duration.as_secs_f64();
        let (packets_per_second, bytes_per_second) = if secs > 0.0 {
            (packets_captured as f64 / secs, bytes_captured as f64 / secs)
        } else {
            (0.0, 0.0)
        };

        CaptureStats {
            packets_captured,
            packets_delivered: c.delivered.load(Ordering::Relaxed),
            queue_dropped: c.queue_dropped.load(Ordering::Relaxed),
            handler_faults: c.handler_faults.load(Ordering::Relaxed),
            packets_skipped: c.skipped.load(Ordering::Relaxed),
            bytes_captured,
            engine: *c.engine.lock(),
            duration,
            packets_per_second,
            bytes_per_second,
        }
    }

    /// Reset all statistics and restart the clock
    pub fn reset(&self) {
        let c = &self.inner;
        for counter in [
            &c.captured,
            &c.delivered,
            &c.queue_dropped,
            &c.handler_faults,
            &c.skipped,
            &c.bytes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *c.engine.lock() = None;
        *c.start_time.lock() = Instant::now();
        *c.end_time.lock() = None;
    }

    /// Stop the clock; rates then refer to the finished run
    pub fn finish(&self) {
        self.inner.end_time.lock().get_or_insert_with(Instant::now);
    }

    pub fn packets_captured(&self) -> u64 {
        self.inner.captured.load(Ordering::Relaxed)
    }

    pub fn packets_delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    pub fn queue_dropped(&self) -> u64 {
        self.inner.queue_dropped.load(Ordering::Relaxed)
    }

    pub fn handler_faults(&self) -> u64 {
        self.inner.handler_faults.load(Ordering::Relaxed)
    }

    /// Time since start, or the length of the run once finished
    pub fn elapsed(&self) -> Duration {
        let start = *self.inner.start_time.lock();
        match *self.inner.end_time.lock() {
            Some(end) => end.saturating_duration_since(start),
            None => start.elapsed(),
        }
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
