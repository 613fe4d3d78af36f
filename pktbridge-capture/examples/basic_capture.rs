//! Example: Decode TCP/UDP ports of live traffic
//!
//! Captures up to 20 packets (or 10 seconds) on the given device using the
//! alloc-less loop and prints the transport header of each one.
//! Note: Requires root/administrator privileges to run.
//!
//! Run with: sudo cargo run --example basic_capture -- eth0

use std::time::Duration;

use pktbridge_capture::{CaptureConfig, CaptureSession, LiveSource, PacketSource, Verdict};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let device = std::env::args().nth(1).unwrap_or_else(|| "lo".to_string());
    println!("Capturing on: {}", device);

    let config = CaptureConfig::default()
        .with_filter("tcp or udp")
        .with_max_packets(20);
    let source = LiveSource::open(&device, &config)?;
    let link = source
        .link_type()
        .ok_or("datalink type not supported by the decoder")?;

    let mut session = CaptureSession::with_config(source, config)?;
    session.stop_handle().stop_after(Duration::from_secs(10));

    let mut n = 0;
    session.start_loop_allocless(move |view| {
        n += 1;
        match view.transport(link) {
            Ok(header) => println!("[{}] {} ({} bytes)", n, header, view.len()),
            Err(e) => println!("[{}] {} bytes, not decoded: {}", n, view.len(), e),
        }
        Verdict::Continue
    })?;

    session.wait()?;

    println!("\n=== Final Statistics ===");
    println!("{}", session.stats().format());

    Ok(())
}
